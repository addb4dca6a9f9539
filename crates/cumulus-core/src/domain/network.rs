//! Elasticip

use super::ids::{Eip, EipId, GuestId};
use super::model::Model;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EipStatus {
    Ready,
    Dealloc,
    DeallocFail,
}

impl EipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Dealloc => "dealloc",
            Self::DeallocFail => "dealloc_fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elasticip {
    pub id: EipId,
    pub name: String,
    pub status: EipStatus,
    pub status_reason: Option<String>,
    pub external_id: Option<String>,
    /// 紐付いている VM
    pub associate_id: Option<GuestId>,
    /// dissociate 後に自動で解放する
    pub auto_dellocate: bool,
}

impl Elasticip {
    pub fn new(id: EipId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: EipStatus::Ready,
            status_reason: None,
            external_id: None,
            associate_id: None,
            auto_dellocate: false,
        }
    }
}

impl Model for Elasticip {
    type Marker = Eip;

    const KEYWORD: &'static str = "eip";

    fn id(&self) -> EipId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
