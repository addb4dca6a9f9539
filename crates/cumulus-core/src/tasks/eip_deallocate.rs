//! EipDeallocateTask - EIP の解放（リモート削除 → 行の削除）

use crate::app::{TaskContext, TaskEngine};
use crate::domain::{Action, EipId, EipStatus, Result, TargetRef, TaskId, UserCred};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum EipDeallocateStage {
        Init => "OnInit",
    }
}

pub struct EipDeallocateTask {
    services: Arc<Services>,
}

impl EipDeallocateTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn dealloc_failed(
        &self,
        ctx: &mut TaskContext,
        eip_id: EipId,
        reason: &str,
    ) -> Result<()> {
        let eip = self
            .services
            .set_eip_status(eip_id, EipStatus::DeallocFail, Some(reason))
            .await?;
        self.services
            .ops_log(&eip, Action::DeallocFail, reason, ctx.user_cred())
            .await;
        ctx.set_stage_failed(reason)
    }
}

#[async_trait]
impl Task for EipDeallocateTask {
    const KIND: &'static str = "EipDeallocateTask";
    type Stage = EipDeallocateStage;
    const INIT: EipDeallocateStage = EipDeallocateStage::Init;

    async fn on_stage(
        &self,
        _stage: EipDeallocateStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let eip_id = ctx.target().eip_id()?;
        let eip = self
            .services
            .set_eip_status(eip_id, EipStatus::Dealloc, None)
            .await?;

        let removed = match self.services.eip_provider.get_ieip(&eip).await {
            Ok(remote) => remote.delete().await,
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = removed {
            return self.dealloc_failed(ctx, eip_id, &err.to_string()).await;
        }

        self.services.stores.eips.mark_deleted(eip_id).await?;
        self.services
            .ops_log(&eip, Action::Dealloc, "", ctx.user_cred())
            .await;
        tracing::info!(%eip_id, "eip deallocated");
        ctx.set_stage_complete(Value::Null)
    }

    async fn on_stage_failed(
        &self,
        _stage: EipDeallocateStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let eip_id = ctx.target().eip_id()?;
        self.dealloc_failed(ctx, eip_id, &reason).await
    }
}

pub async fn start_eip_deallocate_task(
    engine: &TaskEngine,
    cred: UserCred,
    eip_id: EipId,
) -> Result<TaskId> {
    engine
        .start_task(
            EipDeallocateTask::KIND,
            TargetRef::Elasticip(eip_id),
            cred,
            json!({}),
            None,
        )
        .await
}
