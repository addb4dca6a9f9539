//! GuestDeleteTask - 停止後の自動削除（shutdown_behavior = terminate）

use crate::sku::ServerSkuManager;
use crate::app::{TaskContext, TaskEngine};
use crate::domain::{Action, Guest, GuestId, GuestStatus, Result, TargetRef, TaskId, UserCred};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum GuestDeleteStage {
        Init => "OnInit",
        OnGuestUndeployComplete => "OnGuestUndeployComplete",
    }
}

pub struct GuestDeleteTask {
    services: Arc<Services>,
}

impl GuestDeleteTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn undeploy(&self, ctx: &mut TaskContext, guest: &Guest) -> Result<()> {
        let host = match guest.host_id {
            Some(host_id) => self.services.stores.hosts.fetch_by_id(host_id).await?,
            None => None,
        };
        let Some(host) = host else {
            return self.finish(ctx, guest).await;
        };

        ctx.set_stage(GuestDeleteStage::OnGuestUndeployComplete)?;
        let requested = match self.services.guest_driver(&guest.hypervisor) {
            Ok(driver) => {
                driver
                    .request_undeploy_guest_on_host(guest, &host, ctx.callback())
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = requested {
            return self.delete_failed(ctx, guest.id, &err.to_string()).await;
        }
        Ok(())
    }

    async fn finish(&self, ctx: &mut TaskContext, guest: &Guest) -> Result<()> {
        self.services.stores.guests.mark_deleted(guest.id).await?;
        ServerSkuManager::new(self.services.clone())
            .invalidate_guest_count(&guest.instance_type)
            .await?;
        self.services
            .ops_log(guest, Action::Delete, "", ctx.user_cred())
            .await;
        tracing::info!(guest_id = %guest.id, "guest deleted");
        ctx.set_stage_complete(Value::Null)
    }

    async fn delete_failed(
        &self,
        ctx: &mut TaskContext,
        guest_id: GuestId,
        reason: &str,
    ) -> Result<()> {
        let guest = self
            .services
            .set_guest_status(guest_id, GuestStatus::DeleteFail, Some(reason))
            .await?;
        self.services
            .ops_log(&guest, Action::DeleteFail, reason, ctx.user_cred())
            .await;
        ctx.set_stage_failed(reason)
    }
}

#[async_trait]
impl Task for GuestDeleteTask {
    const KIND: &'static str = "GuestDeleteTask";
    type Stage = GuestDeleteStage;
    const INIT: GuestDeleteStage = GuestDeleteStage::Init;

    async fn on_stage(
        &self,
        stage: GuestDeleteStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let guest_id = ctx.target().guest_id()?;
        match stage {
            GuestDeleteStage::Init => {
                let guest = self
                    .services
                    .set_guest_status(guest_id, GuestStatus::Deleting, None)
                    .await?;
                self.undeploy(ctx, &guest).await
            }
            GuestDeleteStage::OnGuestUndeployComplete => {
                let guest = self.services.stores.guests.get(guest_id).await?;
                self.finish(ctx, &guest).await
            }
        }
    }

    async fn on_stage_failed(
        &self,
        _stage: GuestDeleteStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let guest_id = ctx.target().guest_id()?;
        self.delete_failed(ctx, guest_id, &reason).await
    }
}

pub async fn start_auto_delete_guest_task(
    engine: &TaskEngine,
    cred: UserCred,
    guest_id: GuestId,
) -> Result<TaskId> {
    engine
        .start_task(
            GuestDeleteTask::KIND,
            TargetRef::Guest(guest_id),
            cred,
            json!({}),
            None,
        )
        .await
}
