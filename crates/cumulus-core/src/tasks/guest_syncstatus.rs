//! GuestSyncstatusTask - ドライバから実際の status を取り直す

use crate::app::{TaskContext, TaskEngine};
use crate::domain::{Action, GuestId, GuestStatus, Result, TargetRef, TaskId, UserCred};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum GuestSyncstatusStage {
        Init => "OnInit",
    }
}

pub struct GuestSyncstatusTask {
    services: Arc<Services>,
}

impl GuestSyncstatusTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn sync_failed(
        &self,
        ctx: &mut TaskContext,
        guest_id: GuestId,
        reason: &str,
    ) -> Result<()> {
        self.services
            .set_guest_status(guest_id, GuestStatus::Unknown, Some(reason))
            .await?;
        ctx.set_stage_failed(reason)
    }
}

#[async_trait]
impl Task for GuestSyncstatusTask {
    const KIND: &'static str = "GuestSyncstatusTask";
    type Stage = GuestSyncstatusStage;
    const INIT: GuestSyncstatusStage = GuestSyncstatusStage::Init;

    async fn on_stage(
        &self,
        _stage: GuestSyncstatusStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let guest = self.services.stores.guests.get(ctx.target().guest_id()?).await?;
        let synced = match self.services.guest_driver(&guest.hypervisor) {
            Ok(driver) => driver.request_sync_status(&guest).await,
            Err(err) => Err(err),
        };
        let status = match synced {
            Ok(status) => status,
            Err(err) => return self.sync_failed(ctx, guest.id, &err.to_string()).await,
        };

        let guest = self.services.set_guest_status(guest.id, status, None).await?;
        self.services
            .ops_log(&guest, Action::SyncStatus, status.as_str(), ctx.user_cred())
            .await;
        ctx.set_stage_complete(json!({"status": status.as_str()}))
    }

    async fn on_stage_failed(
        &self,
        _stage: GuestSyncstatusStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let guest_id = ctx.target().guest_id()?;
        self.sync_failed(ctx, guest_id, &reason).await
    }
}

pub async fn start_guest_syncstatus_task(
    engine: &TaskEngine,
    cred: UserCred,
    guest_id: GuestId,
) -> Result<TaskId> {
    engine
        .start_task(
            GuestSyncstatusTask::KIND,
            TargetRef::Guest(guest_id),
            cred,
            json!({}),
            None,
        )
        .await
}
