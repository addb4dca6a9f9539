//! Cloudregion / Cloudprovider

use super::ids::{Provider, ProviderId, Region, RegionId};
use super::model::Model;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cloudregion {
    pub id: RegionId,
    pub name: String,
    pub provider: String,
    pub external_id: String,
    /// 所属するクラウドアカウント（ローカルのリージョンは None）
    pub manager_id: Option<ProviderId>,
}

impl Model for Cloudregion {
    type Marker = Region;

    const KEYWORD: &'static str = "cloudregion";

    fn id(&self) -> RegionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cloudprovider {
    pub id: ProviderId,
    pub name: String,
    pub provider: String,
    pub enabled: bool,
}

impl Model for Cloudprovider {
    type Marker = Provider;

    const KEYWORD: &'static str = "cloudprovider";

    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
