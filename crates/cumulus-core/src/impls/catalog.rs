//! StaticSkuCatalog - メモリ上の SKU カタログ
//!
//! リージョンの external id ごとに CatalogSku の一覧を持ちます。
//! JSON（`{"<region external id>": [ {...}, ... ]}`）から読み込めます。

use crate::domain::{CumulusError, Result};
use crate::ports::{CatalogSku, SkuCatalog};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct StaticSkuCatalog {
    regions: RwLock<HashMap<String, Vec<CatalogSku>>>,
}

impl StaticSkuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let regions: HashMap<String, Vec<CatalogSku>> = serde_json::from_str(json)?;
        Ok(Self {
            regions: RwLock::new(regions),
        })
    }

    /// リージョンのカタログを丸ごと差し替える
    pub async fn set_region(&self, region_external_id: impl Into<String>, skus: Vec<CatalogSku>) {
        self.regions
            .write()
            .await
            .insert(region_external_id.into(), skus);
    }
}

#[async_trait]
impl SkuCatalog for StaticSkuCatalog {
    async fn server_skus_by_region_external_id(
        &self,
        region_external_id: &str,
    ) -> Result<Vec<CatalogSku>> {
        self.regions
            .read()
            .await
            .get(region_external_id)
            .cloned()
            .ok_or_else(|| CumulusError::not_found("sku_catalog", region_external_id))
    }
}
