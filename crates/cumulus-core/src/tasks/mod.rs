//! Task implementations
//!
//! すべてのタスクは `Arc<Services>` を持ち、`register_all` で EngineBuilder に登録します。
//!
//! | KIND | 対象 | 連鎖 |
//! |------|------|------|
//! | GuestStopTask | guest | terminate なら GuestDeleteTask |
//! | GuestDeleteTask | guest | |
//! | GuestSyncstatusTask | guest | |
//! | EipDissociateTask | eip | GuestSyncstatusTask / EipDeallocateTask |
//! | EipDeallocateTask | eip | |
//! | ServerSkuDeleteTask | serversku | |
//! | ServerSkuCacheTask | serversku | |

pub mod eip_deallocate;
pub mod eip_dissociate;
pub mod guest_delete;
pub mod guest_stop;
pub mod guest_syncstatus;
pub mod sku_cache;
pub mod sku_delete;

pub use self::eip_deallocate::{EipDeallocateTask, start_eip_deallocate_task};
pub use self::eip_dissociate::{EipDissociateTask, start_eip_dissociate_task};
pub use self::guest_delete::{GuestDeleteTask, start_auto_delete_guest_task};
pub use self::guest_stop::{GuestStopTask, start_guest_stop_task};
pub use self::guest_syncstatus::{GuestSyncstatusTask, start_guest_syncstatus_task};
pub use self::sku_cache::{ServerSkuCacheTask, start_server_sku_cache_task};
pub use self::sku_delete::{ServerSkuDeleteTask, start_server_sku_delete_task};

use crate::app::EngineBuilder;
use crate::services::Services;
use crate::typed::{RegistryError, Task};
use std::sync::Arc;

pub const ALL_TASK_KINDS: &[&str] = &[
    GuestStopTask::KIND,
    GuestDeleteTask::KIND,
    GuestSyncstatusTask::KIND,
    EipDissociateTask::KIND,
    EipDeallocateTask::KIND,
    ServerSkuDeleteTask::KIND,
    ServerSkuCacheTask::KIND,
];

/// 全タスクを登録し、build 時に揃っていることを確認させる
pub fn register_all(
    builder: EngineBuilder,
    services: &Arc<Services>,
) -> Result<EngineBuilder, RegistryError> {
    Ok(builder
        .register(GuestStopTask::new(services.clone()))?
        .register(GuestDeleteTask::new(services.clone()))?
        .register(GuestSyncstatusTask::new(services.clone()))?
        .register(EipDissociateTask::new(services.clone()))?
        .register(EipDeallocateTask::new(services.clone()))?
        .register(ServerSkuDeleteTask::new(services.clone()))?
        .register(ServerSkuCacheTask::new(services.clone()))?
        .expect_tasks(ALL_TASK_KINDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::TestEnv;

    #[test]
    fn every_kind_is_registered() {
        let env = TestEnv::new();
        for kind in ALL_TASK_KINDS {
            assert!(env.engine.registry().get(kind).is_some(), "{kind} missing");
        }
    }

    #[test]
    fn registering_twice_is_rejected() {
        let env = TestEnv::new();
        let builder = register_all(EngineBuilder::new(), &env.services).unwrap();
        let err = register_all(builder, &env.services).err().unwrap();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }
}
