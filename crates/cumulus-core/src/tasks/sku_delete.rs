//! ServerSkuDeleteTask - SKU の削除
//!
//! OneCloud の SKU は、purge でなければ有効な private cloud 上のフレーバーも消します。
//! リモートで NotFound なら消えているものとして扱います。

use crate::app::{TaskContext, TaskEngine};
use crate::domain::{
    Action, Cloudprovider, Result, ServerSku, SkuId, SkuStatus, TargetRef, TaskId, UserCred,
};
use crate::services::Services;
use crate::sku::ServerSkuManager;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum ServerSkuDeleteStage {
        Init => "OnInit",
    }
}

pub struct ServerSkuDeleteTask {
    services: Arc<Services>,
}

impl ServerSkuDeleteTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// private cloud 側のフレーバーを削除。最初の失敗で理由を返す
    async fn delete_remote(&self, sku: &ServerSku) -> Result<Option<String>> {
        let config = &self.services.config.sku;
        let providers = self
            .services
            .stores
            .providers
            .query(&|p: &Cloudprovider| p.enabled && config.is_private_cloud(&p.provider))
            .await?;
        for provider in providers {
            let Some(driver) = self.services.provider_driver(&provider.provider) else {
                tracing::warn!(
                    provider = %provider.provider,
                    "no provider driver, skip remote sku delete"
                );
                continue;
            };
            match driver.delete_sku(&provider, sku).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Ok(Some(format!(
                        "failed to delete sku {} on {}: {err}",
                        sku.name, provider.name
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn delete_failed(
        &self,
        ctx: &mut TaskContext,
        sku_id: SkuId,
        reason: &str,
    ) -> Result<()> {
        let sku = self
            .services
            .set_sku_status(sku_id, SkuStatus::DeleteFailed, Some(reason))
            .await?;
        self.services
            .ops_log(&sku, Action::DeleteFail, reason, ctx.user_cred())
            .await;
        ctx.set_stage_failed(reason)
    }
}

#[async_trait]
impl Task for ServerSkuDeleteTask {
    const KIND: &'static str = "ServerSkuDeleteTask";
    type Stage = ServerSkuDeleteStage;
    const INIT: ServerSkuDeleteStage = ServerSkuDeleteStage::Init;

    async fn on_stage(
        &self,
        _stage: ServerSkuDeleteStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let sku = self.services.stores.skus.get(ctx.target().sku_id()?).await?;
        let manager = ServerSkuManager::new(self.services.clone());

        // 起動後に guest が作られた場合に備えて再確認する
        if let Err(err) = manager.validate_delete_condition(&sku).await {
            return self.delete_failed(ctx, sku.id, &err.to_string()).await;
        }

        let purge = ctx.record().param_bool("purge");
        if !purge && sku.is_onecloud() {
            if let Some(reason) = self.delete_remote(&sku).await? {
                return self.delete_failed(ctx, sku.id, &reason).await;
            }
        }

        manager.real_delete(ctx.user_cred(), &sku).await?;
        ctx.set_stage_complete(Value::Null)
    }

    async fn on_stage_failed(
        &self,
        _stage: ServerSkuDeleteStage,
        ctx: &mut TaskContext,
        reason: String,
    ) -> Result<()> {
        let sku_id = ctx.target().sku_id()?;
        self.delete_failed(ctx, sku_id, &reason).await
    }
}

/// SKU を deleting にしてからタスクを投入する
pub async fn start_server_sku_delete_task(
    engine: &TaskEngine,
    services: &Services,
    cred: UserCred,
    sku_id: SkuId,
    purge: bool,
) -> Result<TaskId> {
    let record = engine
        .new_task(
            ServerSkuDeleteTask::KIND,
            TargetRef::ServerSku(sku_id),
            cred,
            json!({"purge": purge}),
            None,
        )
        .await?;
    services
        .set_sku_status(sku_id, SkuStatus::Deleting, Some("start to delete"))
        .await?;
    engine.schedule_run(record.id, Value::Null).await?;
    Ok(record.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sku::{
        PROVIDER_ALIYUN, PROVIDER_ONECLOUD, PROVIDER_OPENSTACK, PROVIDER_ZSTACK,
    };
    use crate::domain::{CumulusError, TaskState, ValidationError};
    use crate::testkit::{RemoteDeleteMode, TestEnv, sku};
    use rstest::rstest;

    async fn onecloud_sku(env: &TestEnv) -> ServerSku {
        let region = env.default_region().await;
        let mut flavor = sku(PROVIDER_ONECLOUD, region.id, 2, 4096);
        flavor.name = "ecs.g1.c2m4".into();
        env.services.stores.skus.insert(flavor).await.unwrap()
    }

    #[tokio::test]
    async fn deletes_remote_flavors_on_enabled_private_clouds() {
        let env = TestEnv::new();
        env.insert_provider("os-prod", PROVIDER_OPENSTACK, true).await;
        env.insert_provider("zs-lab", PROVIDER_ZSTACK, false).await;
        env.insert_provider("ali", PROVIDER_ALIYUN, true).await;
        let flavor = onecloud_sku(&env).await;

        let task_id = env
            .sku_manager()
            .delete(&env.engine, &env.cred, flavor.id, false)
            .await
            .unwrap();
        assert_eq!(
            env.services.stores.skus.get(flavor.id).await.unwrap().status,
            SkuStatus::Deleting
        );
        env.run_until_idle().await;

        assert_eq!(
            env.engine.fetch_task(task_id).await.unwrap().state,
            TaskState::Complete
        );
        assert_eq!(
            env.provider_driver.deleted().await,
            vec![("os-prod".to_string(), "ecs.g1.c2m4".to_string())]
        );
        assert!(env.services.stores.skus.fetch_by_id(flavor.id).await.unwrap().is_none());
        assert_eq!(env.scheduler.sku_syncs(), 1);
    }

    #[rstest]
    #[case(RemoteDeleteMode::NotFound, TaskState::Complete)]
    #[case(RemoteDeleteMode::Error, TaskState::Failed)]
    #[tokio::test]
    async fn remote_delete_outcomes(#[case] mode: RemoteDeleteMode, #[case] expected: TaskState) {
        let env = TestEnv::new();
        env.provider_driver.set_delete_mode(mode).await;
        env.insert_provider("os-prod", PROVIDER_OPENSTACK, true).await;
        let flavor = onecloud_sku(&env).await;

        let task_id = env
            .sku_manager()
            .delete(&env.engine, &env.cred, flavor.id, false)
            .await
            .unwrap();
        env.run_until_idle().await;

        let record = env.engine.fetch_task(task_id).await.unwrap();
        assert_eq!(record.state, expected);
        let row = env.services.stores.skus.fetch_by_id(flavor.id).await.unwrap();
        match expected {
            TaskState::Complete => assert!(row.is_none()),
            _ => {
                let row = row.unwrap();
                assert_eq!(row.status, SkuStatus::DeleteFailed);
                assert!(row.status_reason.unwrap().contains("os-prod"));
            }
        }
    }

    #[tokio::test]
    async fn purge_skips_remote_cleanup() {
        let env = TestEnv::new();
        env.insert_provider("os-prod", PROVIDER_OPENSTACK, true).await;
        let flavor = onecloud_sku(&env).await;

        env.sku_manager()
            .delete(&env.engine, &env.cred, flavor.id, true)
            .await
            .unwrap();
        env.run_until_idle().await;

        assert!(env.provider_driver.deleted().await.is_empty());
        assert!(env.services.stores.skus.fetch_by_id(flavor.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guest_created_after_start_fails_the_task() {
        let env = TestEnv::new();
        let flavor = onecloud_sku(&env).await;

        let record = env
            .engine
            .new_task(
                ServerSkuDeleteTask::KIND,
                TargetRef::ServerSku(flavor.id),
                env.cred.clone(),
                json!({}),
                None,
            )
            .await
            .unwrap();
        let mut guest = env.insert_guest("vm-late", None).await;
        guest.instance_type = flavor.name.clone();
        env.replace_guest(guest).await;
        env.engine.schedule_run(record.id, Value::Null).await.unwrap();
        env.run_until_idle().await;

        let record = env.engine.fetch_task(record.id).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert!(record.message.unwrap().contains("in use"));
        assert_eq!(
            env.services.stores.skus.get(flavor.id).await.unwrap().status,
            SkuStatus::DeleteFailed
        );
    }

    #[tokio::test]
    async fn in_use_sku_is_rejected_before_a_task_exists() {
        let env = TestEnv::new();
        let flavor = onecloud_sku(&env).await;
        let mut guest = env.insert_guest("vm-1", None).await;
        guest.instance_type = flavor.name.clone();
        env.replace_guest(guest).await;

        let err = env
            .sku_manager()
            .delete(&env.engine, &env.cred, flavor.id, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CumulusError::Validation(ValidationError::NotEmpty(_))
        ));
        assert_eq!(env.engine.counts().await.unwrap().total(), 0);
    }
}
