//! Guest / Host

use super::ids::{Guest as GuestMarker, GuestId, Host as HostMarker, HostId};
use super::model::Model;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestStatus {
    Running,
    Ready,
    Stopping,
    StopFail,
    DissociateEip,
    DissociateEipFail,
    Deleting,
    DeleteFail,
    Unknown,
}

impl GuestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::StopFail => "stop_fail",
            Self::DissociateEip => "dissociate_eip",
            Self::DissociateEipFail => "dissociate_eip_fail",
            Self::Deleting => "deleting",
            Self::DeleteFail => "delete_fail",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownBehavior {
    #[default]
    Stop,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    pub status: GuestStatus,
    pub status_reason: Option<String>,
    pub hypervisor: String,
    pub host_id: Option<HostId>,
    /// HA 構成の backup 側
    pub backup_host_id: Option<HostId>,
    /// ServerSku の name
    pub instance_type: String,
    pub shutdown_behavior: ShutdownBehavior,
    pub disable_delete: bool,
}

impl Guest {
    pub fn new(id: GuestId, name: impl Into<String>, hypervisor: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: GuestStatus::Running,
            status_reason: None,
            hypervisor: hypervisor.into(),
            host_id: None,
            backup_host_id: None,
            instance_type: String::new(),
            shutdown_behavior: ShutdownBehavior::Stop,
            disable_delete: true,
        }
    }
}

impl Model for Guest {
    type Marker = GuestMarker;

    const KEYWORD: &'static str = "guest";

    fn id(&self) -> GuestId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub zone_id: Option<String>,
}

impl Model for Host {
    type Marker = HostMarker;

    const KEYWORD: &'static str = "host";

    fn id(&self) -> HostId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
