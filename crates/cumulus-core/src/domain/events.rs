//! Events - 監査ログ（op-log / action-log）
//!
//! op-log はオブジェクトの状態変化、action-log はユーザー操作の成否を記録します。
//! 永続化は EventSink の実装に任せます。

use super::model::Model;
use super::task::UserCred;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    DeleteFail,
    Enable,
    Disable,
    Stopping,
    Stop,
    StopFail,
    VmStop,
    EipDetach,
    VmDissociate,
    Dealloc,
    DeallocFail,
    CacheSku,
    CacheSkuFail,
    SyncStatus,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteFail => "delete_fail",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Stopping => "stopping",
            Self::Stop => "stop",
            Self::StopFail => "stop_fail",
            Self::VmStop => "vm_stop",
            Self::EipDetach => "eip_detach",
            Self::VmDissociate => "vm_dissociate",
            Self::Dealloc => "dealloc",
            Self::DeallocFail => "dealloc_fail",
            Self::CacheSku => "cache_sku",
            Self::CacheSkuFail => "cache_sku_fail",
            Self::SyncStatus => "sync_status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 監査ログの対象
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub keyword: &'static str,
    pub id: String,
    pub name: String,
}

impl ObjectRef {
    pub fn of<M: Model>(model: &M) -> Self {
        Self {
            keyword: M::KEYWORD,
            id: model.id().to_string(),
            name: model.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "log", rename_all = "snake_case")]
pub enum DomainEvent {
    OpsLog {
        object: ObjectRef,
        action: Action,
        notes: String,
        user: String,
    },
    ActionLog {
        object: ObjectRef,
        action: Action,
        notes: String,
        user: String,
        success: bool,
    },
}

impl DomainEvent {
    pub fn ops_log<M: Model>(
        model: &M,
        action: Action,
        notes: impl Into<String>,
        cred: &UserCred,
    ) -> Self {
        Self::OpsLog {
            object: ObjectRef::of(model),
            action,
            notes: notes.into(),
            user: cred.user.clone(),
        }
    }

    pub fn action_log<M: Model>(
        model: &M,
        action: Action,
        notes: impl Into<String>,
        cred: &UserCred,
        success: bool,
    ) -> Self {
        Self::ActionLog {
            object: ObjectRef::of(model),
            action,
            notes: notes.into(),
            user: cred.user.clone(),
            success,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::OpsLog { action, .. } | Self::ActionLog { action, .. } => *action,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        match self {
            Self::OpsLog { object, .. } | Self::ActionLog { object, .. } => object,
        }
    }

    pub fn is_action_log(&self) -> bool {
        matches!(self, Self::ActionLog { .. })
    }
}
