//! Cloud provider ports - 各クラウドの API クライアントの抽象化
//!
//! OpenStack / Azure / Aliyun などの具体的なクライアントは範囲外。
//! ここではコアが必要とする能力だけを trait として定義します。

use crate::app::TaskCallback;
use crate::domain::{
    Cloudprovider, Cloudregion, Elasticip, Guest, GuestStatus, Host, Result, SaleStatus,
    ServerSku, SkuSpec,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// リモートの SKU（private cloud のフレーバーなど）
pub trait CloudSku: Send + Sync {
    fn name(&self) -> &str;
    fn instance_type_family(&self) -> &str;
    fn instance_type_category(&self) -> &str;
    fn prepaid_status(&self) -> SaleStatus;
    fn postpaid_status(&self) -> SaleStatus;
    fn cpu_core_count(&self) -> u32;
    fn memory_size_mb(&self) -> u32;
    /// os / disk / nic / gpu の属性
    fn spec(&self) -> SkuSpec;
}

/// 公開カタログの 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSku {
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    pub cpu_core_count: u32,
    pub memory_size_mb: u32,
    #[serde(default)]
    pub prepaid_status: SaleStatus,
    #[serde(default)]
    pub postpaid_status: SaleStatus,
    #[serde(default)]
    pub instance_type_family: String,
    #[serde(default)]
    pub instance_type_category: String,
    #[serde(flatten)]
    pub spec: SkuSpec,
}

impl CloudSku for CatalogSku {
    fn name(&self) -> &str {
        &self.name
    }

    fn instance_type_family(&self) -> &str {
        &self.instance_type_family
    }

    fn instance_type_category(&self) -> &str {
        &self.instance_type_category
    }

    fn prepaid_status(&self) -> SaleStatus {
        self.prepaid_status
    }

    fn postpaid_status(&self) -> SaleStatus {
        self.postpaid_status
    }

    fn cpu_core_count(&self) -> u32 {
        self.cpu_core_count
    }

    fn memory_size_mb(&self) -> u32 {
        self.memory_size_mb
    }

    fn spec(&self) -> SkuSpec {
        self.spec.clone()
    }
}

/// 公開クラウドの SKU カタログ（リージョンの external id 単位）
#[async_trait]
pub trait SkuCatalog: Send + Sync {
    async fn server_skus_by_region_external_id(
        &self,
        region_external_id: &str,
    ) -> Result<Vec<CatalogSku>>;
}

/// リモートの EIP ハンドル
#[async_trait]
pub trait CloudEip: Send + Sync {
    fn external_id(&self) -> &str;

    /// 紐付いているリソースの external id（なければ None）
    fn association_external_id(&self) -> Option<String>;

    async fn dissociate(&self) -> Result<()>;

    async fn delete(&self) -> Result<()>;
}

#[async_trait]
pub trait EipProvider: Send + Sync {
    /// リモートに存在しなければ `CumulusError::NotFound`
    async fn get_ieip(&self, eip: &Elasticip) -> Result<Arc<dyn CloudEip>>;
}

/// hypervisor ごとのホストドライバ
///
/// `request_*_on_host` は非同期。完了は `callback.complete`、失敗は `callback.fail` で通知され、
/// 戻り値の Err は「依頼そのものが送れなかった」ことを表します。
#[async_trait]
pub trait GuestDriver: Send + Sync {
    async fn request_stop_on_host(
        &self,
        guest: &Guest,
        host: &Host,
        callback: TaskCallback,
    ) -> Result<()>;

    async fn request_undeploy_guest_on_host(
        &self,
        guest: &Guest,
        host: &Host,
        callback: TaskCallback,
    ) -> Result<()>;

    async fn request_sync_status(&self, guest: &Guest) -> Result<GuestStatus>;
}

/// private cloud アカウントのフレーバー操作
#[async_trait]
pub trait CloudProviderDriver: Send + Sync {
    /// 作成したフレーバーの external id を返す
    async fn create_sku(
        &self,
        provider: &Cloudprovider,
        region: &Cloudregion,
        sku: &ServerSku,
    ) -> Result<String>;

    /// 存在しなければ `CumulusError::NotFound`
    async fn delete_sku(&self, provider: &Cloudprovider, sku: &ServerSku) -> Result<()>;
}
