//! ServerSkuCacheTask - private cloud のリージョンに SKU を作る

use crate::app::{TaskContext, TaskEngine};
use crate::domain::{
    Action, CumulusError, RegionId, Result, ServerSku, SkuId, TargetRef, TaskId,
    UserCred, ValidationError,
};
use crate::services::Services;
use crate::typed::Task;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

crate::task_stages! {
    pub enum ServerSkuCacheStage {
        Init => "OnInit",
    }
}

pub struct ServerSkuCacheTask {
    services: Arc<Services>,
}

impl ServerSkuCacheTask {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// リモートに作成し、external id とリージョン名を返す
    async fn cache_sku(&self, ctx: &TaskContext, sku: &ServerSku) -> Result<(String, String)> {
        let region_id: RegionId = ctx
            .record()
            .param_str("cloudregion_id")
            .ok_or_else(|| ValidationError::InputParameter("missing cloudregion_id".into()))?
            .parse()
            .map_err(|err| {
                ValidationError::InputParameter(format!("invalid cloudregion_id: {err}"))
            })?;
        let stores = &self.services.stores;
        let region = stores.regions.get(region_id).await?;
        let manager_id = region.manager_id.ok_or_else(|| {
            CumulusError::internal(format!("region {} has no cloudprovider", region.name))
        })?;
        let provider = stores.providers.get(manager_id).await?;
        let driver = self
            .services
            .provider_driver(&provider.provider)
            .ok_or_else(|| {
                CumulusError::internal(format!("no provider driver for {}", provider.provider))
            })?;
        let external_id = driver.create_sku(&provider, &region, sku).await?;
        Ok((external_id, region.name))
    }
}

#[async_trait]
impl Task for ServerSkuCacheTask {
    const KIND: &'static str = "ServerSkuCacheTask";
    type Stage = ServerSkuCacheStage;
    const INIT: ServerSkuCacheStage = ServerSkuCacheStage::Init;

    async fn on_stage(
        &self,
        _stage: ServerSkuCacheStage,
        ctx: &mut TaskContext,
        _data: Value,
    ) -> Result<()> {
        let sku = self.services.stores.skus.get(ctx.target().sku_id()?).await?;
        match self.cache_sku(ctx, &sku).await {
            Ok((external_id, region)) => {
                self.services
                    .ops_log(&sku, Action::CacheSku, format!("cached on {region}"), ctx.user_cred())
                    .await;
                ctx.set_stage_complete(json!({"external_id": external_id}))
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(sku_id = %sku.id, error = %reason, "cache sku failed");
                self.services
                    .ops_log(&sku, Action::CacheSkuFail, reason.clone(), ctx.user_cred())
                    .await;
                ctx.set_stage_failed(reason)
            }
        }
    }
}

pub async fn start_server_sku_cache_task(
    engine: &TaskEngine,
    cred: UserCred,
    sku_id: SkuId,
    region_id: RegionId,
) -> Result<TaskId> {
    engine
        .start_task(
            ServerSkuCacheTask::KIND,
            TargetRef::ServerSku(sku_id),
            cred,
            json!({"cloudregion_id": region_id.to_string()}),
            None,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use crate::domain::sku::{PROVIDER_ONECLOUD, PROVIDER_OPENSTACK};
    use crate::testkit::{TestEnv, sku};

    #[tokio::test]
    async fn creates_flavor_on_private_region() {
        let env = TestEnv::new();
        let provider = env.insert_provider("os-prod", PROVIDER_OPENSTACK, true).await;
        let region = env
            .insert_region("RegionOne", PROVIDER_OPENSTACK, "os/RegionOne", Some(provider.id))
            .await;
        let local = env.default_region().await;
        let mut flavor = sku(PROVIDER_ONECLOUD, local.id, 4, 8192);
        flavor.name = "ecs.g1.c4m8".into();
        let flavor = env.services.stores.skus.insert(flavor).await.unwrap();

        let task_id = env
            .sku_manager()
            .perform_cache_sku(&env.engine, &env.cred, flavor.id, region.id)
            .await
            .unwrap();
        env.run_until_idle().await;

        let record = env.engine.fetch_task(task_id).await.unwrap();
        assert_eq!(record.state, TaskState::Complete);
        assert_eq!(
            record.result,
            Some(json!({"external_id": "os-prod/RegionOne/ecs.g1.c4m8"}))
        );
        assert_eq!(
            env.events.actions_for(&flavor.id.to_string()).await,
            vec![Action::CacheSku]
        );
    }

    #[tokio::test]
    async fn driver_failure_fails_the_task() {
        let env = TestEnv::new();
        env.provider_driver.fail_create(true).await;
        let provider = env.insert_provider("os-prod", PROVIDER_OPENSTACK, true).await;
        let region = env
            .insert_region("RegionOne", PROVIDER_OPENSTACK, "os/RegionOne", Some(provider.id))
            .await;
        let local = env.default_region().await;
        let flavor = env
            .services
            .stores
            .skus
            .insert(sku(PROVIDER_ONECLOUD, local.id, 1, 1024))
            .await
            .unwrap();

        let task_id =
            start_server_sku_cache_task(&env.engine, env.cred.clone(), flavor.id, region.id)
                .await
                .unwrap();
        env.run_until_idle().await;

        let record = env.engine.fetch_task(task_id).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(
            env.events.actions_for(&flavor.id.to_string()).await,
            vec![Action::CacheSkuFail]
        );
    }
}
