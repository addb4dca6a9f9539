//! Domain model (IDs, errors, task records, inventory entities, events).

pub mod cloud;
pub mod compute;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod model;
pub mod network;
pub mod sku;
pub mod state;
pub mod sync_result;
pub mod task;

pub use self::cloud::{Cloudprovider, Cloudregion};
pub use self::compute::{Guest, GuestStatus, Host, ShutdownBehavior};
pub use self::envelope::{DispatchKind, StageEnvelope};
pub use self::errors::{CumulusError, ErrorKind, Result, ValidationError};
pub use self::events::{Action, DomainEvent, ObjectRef};
pub use self::ids::{EipId, GuestId, HostId, Id, IdMarker, ProviderId, RegionId, SkuId, TaskId};
pub use self::model::Model;
pub use self::network::{EipStatus, Elasticip};
pub use self::sku::{SaleStatus, ServerSku, SkuSpec, SkuStatus};
pub use self::state::TaskState;
pub use self::sync_result::SyncResult;
pub use self::task::{ParentLink, TargetRef, TaskRecord, UserCred};
