//! GuestStopTask - VM の停止
//!
//! ```text
//! OnInit ──request_stop_on_host──▶ OnMasterStopTaskComplete ──(backup あり)──▶ OnGuestStopTaskComplete
//!    │                                   │ (backup なし)                              │
//!    └──────── 失敗 ──▶ stop_fail          └────────────────▶ ready ◀──────────────────┘
//! ```
//!
//! サブタスク（`subtask` param）として起動された場合、guest の status は親に任せます。

use super::guest_delete::start_auto_delete_guest_task;
use crate::app::{TaskContext, TaskEngine};
use crate::domain::{
    Action, Guest, GuestId, GuestStatus, Host, Result, ShutdownBehavior, TargetRef, TaskId,
    UserCred,
};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum GuestStopStage {
        Init => "OnInit",
        OnMasterStopTaskComplete => "OnMasterStopTaskComplete",
        OnGuestStopTaskComplete => "OnGuestStopTaskComplete",
    }
}

pub struct GuestStopTask {
    services: Arc<Services>,
}

impl GuestStopTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn stop_guest(&self, ctx: &mut TaskContext, guest: &Guest) -> Result<()> {
        let host = match guest.host_id {
            Some(host_id) => self.services.stores.hosts.fetch_by_id(host_id).await?,
            None => None,
        };
        let Some(host) = host else {
            return self.on_stop_failed(ctx, guest.id, "no associated host").await;
        };

        if !ctx.is_subtask() {
            self.services
                .set_guest_status(guest.id, GuestStatus::Stopping, None)
                .await?;
        }
        ctx.set_stage(GuestStopStage::OnMasterStopTaskComplete)?;
        self.request_stop(ctx, guest, &host).await
    }

    /// driver に停止を依頼する。依頼そのものが失敗したら失敗処理へ
    async fn request_stop(&self, ctx: &mut TaskContext, guest: &Guest, host: &Host) -> Result<()> {
        let requested = match self.services.guest_driver(&guest.hypervisor) {
            Ok(driver) => driver.request_stop_on_host(guest, host, ctx.callback()).await,
            Err(err) => Err(err),
        };
        if let Err(err) = requested {
            tracing::error!(
                guest_id = %guest.id,
                host_id = %host.id,
                error = %err,
                "request_stop_on_host failed"
            );
            return self.on_stop_failed(ctx, guest.id, &err.to_string()).await;
        }
        Ok(())
    }

    async fn on_stop_complete(&self, ctx: &mut TaskContext, guest_id: GuestId) -> Result<()> {
        let guest = if ctx.is_subtask() {
            self.services.stores.guests.get(guest_id).await?
        } else {
            self.services
                .set_guest_status(guest_id, GuestStatus::Ready, None)
                .await?
        };
        self.services
            .ops_log(&guest, Action::Stop, guest.name.clone(), ctx.user_cred())
            .await;
        if let Some(host_id) = guest.host_id {
            if let Err(err) = self.services.scheduler.clear_host_sched_desc_cache(host_id).await {
                tracing::warn!(%host_id, error = %err, "failed to clear host sched desc cache");
            }
        }
        ctx.set_stage_complete(Value::Null)?;

        if guest.status == GuestStatus::Ready
            && !guest.disable_delete
            && guest.shutdown_behavior == ShutdownBehavior::Terminate
        {
            let cred = ctx.user_cred().clone();
            if let Err(err) = start_auto_delete_guest_task(ctx.engine(), cred, guest.id).await {
                tracing::warn!(guest_id = %guest.id, error = %err, "failed to start auto delete");
            }
        }
        self.services
            .action_log(&guest, Action::VmStop, "", ctx.user_cred(), true)
            .await;
        Ok(())
    }

    async fn on_stop_failed(
        &self,
        ctx: &mut TaskContext,
        guest_id: GuestId,
        reason: &str,
    ) -> Result<()> {
        let guest = self
            .services
            .set_guest_status(guest_id, GuestStatus::StopFail, Some(reason))
            .await?;
        self.services
            .ops_log(&guest, Action::StopFail, reason, ctx.user_cred())
            .await;
        ctx.set_stage_failed(reason)?;
        self.services
            .action_log(&guest, Action::VmStop, reason, ctx.user_cred(), false)
            .await;
        Ok(())
    }
}

#[async_trait]
impl Task for GuestStopTask {
    const KIND: &'static str = "GuestStopTask";
    type Stage = GuestStopStage;
    const INIT: GuestStopStage = GuestStopStage::Init;

    async fn on_stage(
        &self,
        stage: GuestStopStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let guest_id = ctx.target().guest_id()?;
        match stage {
            GuestStopStage::Init => {
                let guest = self.services.stores.guests.get(guest_id).await?;
                self.services
                    .ops_log(&guest, Action::Stopping, "", ctx.user_cred())
                    .await;
                self.stop_guest(ctx, &guest).await
            }
            GuestStopStage::OnMasterStopTaskComplete => {
                let guest = self.services.stores.guests.get(guest_id).await?;
                let Some(backup_id) = guest.backup_host_id else {
                    return self.on_stop_complete(ctx, guest_id).await;
                };
                let Some(backup) = self.services.stores.hosts.fetch_by_id(backup_id).await? else {
                    let reason = format!("backup host {backup_id} not found");
                    return self.on_stop_failed(ctx, guest_id, &reason).await;
                };
                ctx.set_stage(GuestStopStage::OnGuestStopTaskComplete)?;
                self.request_stop(ctx, &guest, &backup).await
            }
            GuestStopStage::OnGuestStopTaskComplete => self.on_stop_complete(ctx, guest_id).await,
        }
    }

    async fn on_stage_failed(
        &self,
        _stage: GuestStopStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let guest_id = ctx.target().guest_id()?;
        self.on_stop_failed(ctx, guest_id, &reason).await
    }
}

pub async fn start_guest_stop_task(
    engine: &TaskEngine,
    cred: UserCred,
    guest_id: GuestId,
) -> Result<TaskId> {
    engine
        .start_task(
            GuestStopTask::KIND,
            TargetRef::Guest(guest_id),
            cred,
            json!({}),
            None,
        )
        .await
}
