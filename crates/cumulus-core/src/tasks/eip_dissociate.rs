//! EipDissociateTask - EIP を VM から外す
//!
//! リモートに EIP が見つからない場合は「既に外れている」とみなして続行します。
//! 外した後は VM の status を同期し、`auto_dellocate` なら解放タスクへつなぎます。

use super::eip_deallocate::start_eip_deallocate_task;
use super::guest_syncstatus::start_guest_syncstatus_task;
use crate::app::{TaskContext, TaskEngine};
use crate::domain::{
    Action, EipId, EipStatus, Elasticip, Guest, GuestStatus, Result, TargetRef, TaskId, UserCred,
};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum EipDissociateStage {
        Init => "OnInit",
    }
}

pub struct EipDissociateTask {
    services: Arc<Services>,
}

impl EipDissociateTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// VM 側の解除。失敗したら理由を返す（呼び出し側で task_fail）
    async fn dissociate_from(
        &self,
        ctx: &TaskContext,
        eip: &Elasticip,
        vm: &Guest,
    ) -> Result<Option<String>> {
        if vm.status != GuestStatus::DissociateEip {
            self.services
                .set_guest_status(vm.id, GuestStatus::DissociateEip, Some("dissociate eip"))
                .await?;
        }

        let remote = match self.services.eip_provider.get_ieip(eip).await {
            Ok(remote) => Some(remote),
            Err(err) if err.is_not_found() => {
                tracing::info!(eip_id = %eip.id, "remote eip not found, treat as dissociated");
                None
            }
            Err(err) => return Ok(Some(format!("fail to find iEIP for eip {err}"))),
        };
        if let Some(remote) = remote {
            if remote.association_external_id().is_some_and(|a| !a.is_empty()) {
                if let Err(err) = remote.dissociate().await {
                    return Ok(Some(format!("fail to remote dissociate eip {err}")));
                }
            }
        }

        if let Err(err) = self
            .services
            .stores
            .eips
            .update_with_lock(eip.id, Box::new(|e: &mut Elasticip| e.associate_id = None))
            .await
        {
            return Ok(Some(format!("fail to local dissociate eip {err}")));
        }
        self.services
            .set_eip_status(eip.id, EipStatus::Ready, Some("dissociate"))
            .await?;
        self.services
            .action_log(vm, Action::VmDissociate, "", ctx.user_cred(), true)
            .await;
        start_guest_syncstatus_task(ctx.engine(), ctx.user_cred().clone(), vm.id).await?;
        Ok(None)
    }

    async fn task_fail(
        &self,
        ctx: &mut TaskContext,
        eip_id: EipId,
        vm: Option<&Guest>,
        reason: &str,
    ) -> Result<()> {
        self.services
            .set_eip_status(eip_id, EipStatus::Ready, Some(reason))
            .await?;
        ctx.set_stage_failed(reason)?;
        if let Some(vm) = vm {
            let vm = self
                .services
                .set_guest_status(vm.id, GuestStatus::DissociateEipFail, Some(reason))
                .await?;
            self.services
                .ops_log(&vm, Action::EipDetach, reason, ctx.user_cred())
                .await;
            self.services
                .action_log(&vm, Action::VmDissociate, reason, ctx.user_cred(), false)
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl Task for EipDissociateTask {
    const KIND: &'static str = "EipDissociateTask";
    type Stage = EipDissociateStage;
    const INIT: EipDissociateStage = EipDissociateStage::Init;

    async fn on_stage(
        &self,
        _stage: EipDissociateStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let eip = self.services.stores.eips.get(ctx.target().eip_id()?).await?;
        let vm = match eip.associate_id {
            Some(guest_id) => self.services.stores.guests.fetch_by_id(guest_id).await?,
            None => None,
        };

        if let Some(vm) = &vm {
            if let Some(reason) = self.dissociate_from(ctx, &eip, vm).await? {
                tracing::error!(
                    eip_id = %eip.id,
                    guest_id = %vm.id,
                    %reason,
                    "eip dissociate failed"
                );
                return self.task_fail(ctx, eip.id, Some(vm), &reason).await;
            }
        }

        ctx.set_stage_complete(Value::Null)?;
        if eip.auto_dellocate || ctx.record().param_bool("auto_delete") {
            start_eip_deallocate_task(ctx.engine(), ctx.user_cred().clone(), eip.id).await?;
        }
        Ok(())
    }

    async fn on_stage_failed(
        &self,
        _stage: EipDissociateStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let eip = self.services.stores.eips.get(ctx.target().eip_id()?).await?;
        let vm = match eip.associate_id {
            Some(guest_id) => self.services.stores.guests.fetch_by_id(guest_id).await?,
            None => None,
        };
        self.task_fail(ctx, eip.id, vm.as_ref(), &reason).await
    }
}

pub async fn start_eip_dissociate_task(
    engine: &TaskEngine,
    cred: UserCred,
    eip_id: EipId,
    auto_delete: bool,
) -> Result<TaskId> {
    engine
        .start_task(
            EipDissociateTask::KIND,
            TargetRef::Elasticip(eip_id),
            cred,
            json!({"auto_delete": auto_delete}),
            None,
        )
        .await
}
