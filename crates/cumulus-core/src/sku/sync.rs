//! SKU 同期 - リモートの SKU カタログとローカル SKU の突き合わせ
//!
//! どちらの同期も class lock（`serversku` × 呼び出し元のプロジェクト）の中で実行します。
//! 個々の行の失敗は SyncResult に数えて先へ進み、前提が崩れたときだけ fatal で打ち切ります。

use super::manager::ServerSkuManager;
use crate::compare::{CompareKey, SetDiff, compare_sets};
use crate::domain::sku::{PROVIDER_ONECLOUD, shape_key};
use crate::domain::{
    Action, Cloudprovider, Cloudregion, Model, Result, SaleStatus, ServerSku, SkuId, SkuStatus,
    SyncResult, UserCred, ValidationError,
};
use crate::ports::{CatalogSku, CloudSku, SkuCatalog};
use std::collections::HashSet;

impl CompareKey for ServerSku {
    /// external id、なければ `region:cpu:memory`
    fn compare_key(&self) -> Result<String> {
        if let Some(external_id) = self.external_id.as_deref().filter(|e| !e.is_empty()) {
            return Ok(external_id.to_string());
        }
        if self.cpu_core_count == 0 || self.memory_size_mb == 0 {
            return Err(ValidationError::InputParameter(format!(
                "serversku {} has neither an external id nor cpu/memory",
                self.name
            ))
            .into());
        }
        Ok(format!(
            "{}:{}:{}",
            self.cloudregion_id, self.cpu_core_count, self.memory_size_mb
        ))
    }
}

/// カタログのエントリを、このリージョンの SKU として組み立てる
pub fn sku_from_catalog(id: SkuId, region: &Cloudregion, entry: &CatalogSku) -> ServerSku {
    let mut sku = ServerSku::new(
        id,
        entry.name.clone(),
        region.provider.clone(),
        region.id,
        entry.cpu_core_count,
        entry.memory_size_mb,
    );
    sku.zone_id = entry.zone_id.clone();
    sku.external_id = entry.external_id.clone();
    sku.prepaid_status = entry.prepaid_status;
    sku.postpaid_status = entry.postpaid_status;
    sku.instance_type_family = entry.instance_type_family.clone();
    sku.instance_type_category = entry.instance_type_category.clone();
    sku.local_category = entry.instance_type_category.clone();
    sku.spec = entry.spec.clone();
    sku
}

impl ServerSkuManager {
    /// 公開クラウドのリージョン 1 つ分を同期する
    ///
    /// - ローカルにだけある SKU → soldout（既に soldout なら数えない）
    /// - 両方にある SKU → zone / 販売状態 / ディスク種別を更新（差分があれば数える）
    /// - リモートにだけある SKU → 追加
    pub async fn sync_server_skus(
        &self,
        cred: &UserCred,
        region: &Cloudregion,
        catalog: &dyn SkuCatalog,
    ) -> SyncResult {
        let mut result = SyncResult::new();
        let _lock = match self
            .services()
            .class_locks
            .lock(ServerSku::KEYWORD, &cred.project)
            .await
        {
            Ok(guard) => guard,
            Err(err) => {
                tracing::warn!(region = %region.name, error = %err, "sku sync skipped");
                result.error(err);
                return result;
            }
        };

        let entries = match catalog
            .server_skus_by_region_external_id(&region.external_id)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                result.error(err);
                return result;
            }
        };
        let remote: Vec<ServerSku> = entries
            .iter()
            .map(|entry| sku_from_catalog(self.services().ids.generate(), region, entry))
            .collect();

        let local = match self.fetch_skus_by_region(region.id).await {
            Ok(local) => local,
            Err(err) => {
                result.error(err);
                return result;
            }
        };

        let SetDiff {
            removed,
            common_local,
            common_remote,
            added,
        } = match compare_sets(local, remote) {
            Ok(diff) => diff,
            Err(err) => {
                result.error(err);
                return result;
            }
        };

        for sku in removed.into_iter().filter(|s| !s.is_soldout()) {
            match self.mark_as_soldout(sku.id).await {
                Ok(_) => result.delete(),
                Err(err) => {
                    tracing::warn!(sku = %sku.name, error = %err, "failed to mark sku as soldout");
                    result.delete_error(format!("{}: {err}", sku.name));
                }
            }
        }

        for (local, remote) in common_local.iter().zip(common_remote) {
            let update = self
                .services()
                .stores
                .skus
                .update_with_lock(
                    local.id,
                    Box::new(move |s: &mut ServerSku| {
                        s.zone_id = remote.zone_id;
                        s.prepaid_status = remote.prepaid_status;
                        s.postpaid_status = remote.postpaid_status;
                        s.spec.sys_disk_type = remote.spec.sys_disk_type;
                        s.spec.data_disk_types = remote.spec.data_disk_types;
                    }),
                )
                .await;
            match update {
                Ok((_, diff)) if diff.is_empty() => {}
                Ok((_, diff)) => {
                    tracing::debug!(sku = %local.name, fields = ?diff.fields(), "sku synced");
                    result.update();
                }
                Err(err) => {
                    tracing::warn!(sku = %local.name, error = %err, "failed to sync sku");
                    result.update_error(format!("{}: {err}", local.name));
                }
            }
        }

        for mut sku in added {
            sku.enabled = true;
            sku.status = SkuStatus::Ready;
            let name = sku.name.clone();
            match self.services().stores.skus.insert(sku).await {
                Ok(_) => result.add(),
                Err(err) => {
                    tracing::warn!(sku = %name, error = %err, "failed to add sku");
                    result.add_error(format!("{name}: {err}"));
                }
            }
        }

        if result.changed() {
            self.invalidate_instance_specs().await;
        }
        tracing::info!(region = %region.name, result = %result, "server skus synced");
        result
    }

    /// private cloud のフレーバーをローカル SKU に取り込む（追加のみ）
    ///
    /// ローカルに同じ `cpu/memory` がなければ、デフォルトリージョンの OneCloud SKU として作ります。
    pub async fn sync_private_cloud_skus<S: CloudSku>(
        &self,
        cred: &UserCred,
        provider: &Cloudprovider,
        skus: &[S],
    ) -> SyncResult {
        let mut result = SyncResult::new();
        let _lock = match self
            .services()
            .class_locks
            .lock(ServerSku::KEYWORD, &cred.project)
            .await
        {
            Ok(guard) => guard,
            Err(err) => {
                result.error(err);
                return result;
            }
        };

        let mut local: HashSet<String> = match self.get_one_cloud_skus().await {
            Ok(keys) => keys.into_iter().collect(),
            Err(err) => {
                result.error(err);
                return result;
            }
        };
        let region = match self.default_region().await {
            Ok(region) => region,
            Err(err) => {
                result.error(err);
                return result;
            }
        };

        for sku in skus {
            let key = shape_key(sku.cpu_core_count(), sku.memory_size_mb());
            if local.contains(&key) {
                continue;
            }
            match self.new_from_cloud_sku(cred, &region, sku).await {
                Ok(_) => {
                    local.insert(key);
                    result.add();
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %provider.name,
                        sku = sku.name(),
                        error = %err,
                        "failed to import sku"
                    );
                    result.add_error(format!("{}: {err}", sku.name()));
                }
            }
        }

        if result.changed() {
            self.invalidate_instance_specs().await;
        }
        tracing::info!(provider = %provider.name, result = %result, "private cloud skus synced");
        result
    }

    async fn new_from_cloud_sku<S: CloudSku>(
        &self,
        cred: &UserCred,
        region: &Cloudregion,
        ext: &S,
    ) -> Result<ServerSku> {
        let name = self.generate_name(ext.name()).await?;
        let mut sku = ServerSku::new(
            self.services().ids.generate(),
            name,
            PROVIDER_ONECLOUD,
            region.id,
            ext.cpu_core_count(),
            ext.memory_size_mb(),
        );
        sku.prepaid_status = ext.prepaid_status();
        sku.postpaid_status = ext.postpaid_status();
        sku.instance_type_family = ext.instance_type_family().to_string();
        sku.instance_type_category = ext.instance_type_category().to_string();
        sku.local_category = sku.instance_type_category.clone();
        sku.spec = ext.spec();

        let sku = self.services().stores.skus.insert(sku).await?;
        self.services()
            .ops_log(&sku, Action::Create, sku.shape_key(), cred)
            .await;
        Ok(sku)
    }

    /// 既存の SKU と重ならない名前（`name`, `name-1`, `name-2`, ...）
    pub async fn generate_name(&self, base: &str) -> Result<String> {
        let prefix = format!("{base}-");
        let taken: HashSet<String> = self
            .services()
            .stores
            .skus
            .query(&|s: &ServerSku| s.name == base || s.name.starts_with(&prefix))
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        if !taken.contains(base) {
            return Ok(base.to_string());
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sku::{PROVIDER_ALIYUN, PROVIDER_OPENSTACK};
    use crate::domain::{CumulusError, ErrorKind, RegionId};
    use crate::impls::StaticSkuCatalog;
    use crate::testkit::{TestEnv, catalog_sku, sku};
    use std::time::Duration;
    use ulid::Ulid;

    async fn aliyun_region(env: &TestEnv) -> Cloudregion {
        env.insert_region("cn-hangzhou", PROVIDER_ALIYUN, "cn-hangzhou", None)
            .await
    }

    async fn catalog_with(entries: Vec<CatalogSku>) -> StaticSkuCatalog {
        let catalog = StaticSkuCatalog::new();
        catalog.set_region("cn-hangzhou", entries).await;
        catalog
    }

    #[test]
    fn compare_key_prefers_external_id() {
        let region = RegionId::from_ulid(Ulid::new());
        let mut s = sku(PROVIDER_ALIYUN, region, 2, 4096);
        assert_eq!(s.compare_key().unwrap(), format!("{region}:2:4096"));

        s.external_id = Some("ecs.g6.large".into());
        assert_eq!(s.compare_key().unwrap(), "ecs.g6.large");

        s.external_id = Some(String::new());
        s.cpu_core_count = 0;
        let err = s.compare_key().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn first_pass_adds_and_second_pass_is_idempotent() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = aliyun_region(&env).await;
        let catalog = catalog_with(vec![
            catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192),
            catalog_sku("ecs.c6.large", Some("c6.large"), 2, 4096),
        ])
        .await;

        let first = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert!(!first.is_error());
        assert_eq!((first.add_cnt, first.update_cnt, first.del_cnt), (2, 0, 0));

        let second = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert!(!second.changed());
        assert_eq!(second.to_string(), "removed 0 failed 0 updated 0 failed 0 added 0 failed 0");

        let skus = manager.fetch_skus_by_region(region.id).await.unwrap();
        assert_eq!(skus.len(), 2);
        assert!(skus.iter().all(|s| s.enabled && s.provider == PROVIDER_ALIYUN));
    }

    #[tokio::test]
    async fn missing_remote_sku_is_marked_soldout_once() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = aliyun_region(&env).await;
        let catalog = catalog_with(vec![
            catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192),
            catalog_sku("ecs.c6.large", Some("c6.large"), 2, 4096),
        ])
        .await;
        manager.sync_server_skus(&env.cred, &region, &catalog).await;

        catalog
            .set_region("cn-hangzhou", vec![catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192)])
            .await;
        let result = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert_eq!(result.del_cnt, 1);

        let c6 = manager
            .fetch_sku_by_name_and_provider("ecs.c6.large", PROVIDER_ALIYUN, true)
            .await
            .unwrap();
        assert!(c6.is_soldout());

        let again = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert_eq!(again.del_cnt, 0);
    }

    #[tokio::test]
    async fn drift_on_common_sku_is_updated() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = aliyun_region(&env).await;
        let catalog =
            catalog_with(vec![catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192)]).await;
        manager.sync_server_skus(&env.cred, &region, &catalog).await;

        let mut changed = catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192);
        changed.postpaid_status = SaleStatus::Soldout;
        changed.zone_id = Some("cn-hangzhou-b".into());
        catalog.set_region("cn-hangzhou", vec![changed]).await;

        let result = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert_eq!((result.update_cnt, result.add_cnt), (1, 0));

        let sku = manager
            .fetch_sku_by_name_and_provider("ecs.g6.large", PROVIDER_ALIYUN, false)
            .await
            .unwrap();
        assert_eq!(sku.postpaid_status, SaleStatus::Soldout);
        assert_eq!(sku.zone_id.as_deref(), Some("cn-hangzhou-b"));
    }

    #[tokio::test]
    async fn unknown_region_is_fatal() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = env
            .insert_region("eu-west-1", PROVIDER_ALIYUN, "eu-west-1", None)
            .await;
        let catalog = StaticSkuCatalog::new();

        let result = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert!(result.is_error());
        assert!(result.to_string().contains("error:"));
        assert_eq!(manager.fetch_skus_by_region(region.id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn malformed_remote_sku_aborts_before_any_change() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = aliyun_region(&env).await;
        let catalog = catalog_with(vec![
            catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192),
            catalog_sku("broken", None, 0, 0),
        ])
        .await;

        let result = manager.sync_server_skus(&env.cred, &region, &catalog).await;
        assert!(result.is_error());
        assert_eq!(result.add_cnt, 0);
        assert!(manager.fetch_skus_by_region(region.id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn held_class_lock_is_a_fatal_contention() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = aliyun_region(&env).await;
        let catalog =
            catalog_with(vec![catalog_sku("ecs.g6.large", Some("g6.large"), 2, 8192)]).await;

        let _held = env
            .services
            .class_locks
            .lock(ServerSku::KEYWORD, &env.cred.project)
            .await
            .unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(120),
            manager.sync_server_skus(&env.cred, &region, &catalog),
        )
        .await
        .unwrap();
        assert!(result.is_error());
        assert!(result.fatal.unwrap().contains("lock contention"));
    }

    #[tokio::test]
    async fn private_cloud_sync_only_adds_missing_shapes() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = env.default_region().await;
        let mut existing = sku(PROVIDER_ONECLOUD, region.id, 2, 4096);
        existing.name = "m1.medium".into();
        env.services.stores.skus.insert(existing).await.unwrap();

        let provider = env.insert_provider("openstack-1", PROVIDER_OPENSTACK, true).await;
        let remote = vec![
            catalog_sku("m1.medium", None, 2, 4096),
            catalog_sku("m1.medium", None, 4, 8192),
            catalog_sku("m1.large", None, 8, 16384),
            catalog_sku("m1.large.dup", None, 8, 16384),
        ];

        let result = manager
            .sync_private_cloud_skus(&env.cred, &provider, &remote)
            .await;
        assert_eq!((result.add_cnt, result.add_err_cnt), (2, 0));

        let mut shapes = manager.get_one_cloud_skus().await.unwrap();
        shapes.sort();
        assert_eq!(shapes, vec!["2/4096", "4/8192", "8/16384"]);

        let renamed = manager
            .fetch_sku_by_name_and_provider("m1.medium-1", PROVIDER_ONECLOUD, false)
            .await
            .unwrap();
        assert_eq!((renamed.cpu_core_count, renamed.memory_size_mb), (4, 8192));
        assert_eq!(renamed.cloudregion_id, region.id);
        assert!(renamed.enabled);

        let again = manager
            .sync_private_cloud_skus(&env.cred, &provider, &remote)
            .await;
        assert!(!again.changed());
    }

    #[tokio::test]
    async fn generate_name_skips_taken_suffixes() {
        let env = TestEnv::new();
        let manager = env.sku_manager();
        let region = env.default_region().await;
        for name in ["flavor", "flavor-1"] {
            let mut s = sku(PROVIDER_ONECLOUD, region.id, 1, 1024);
            s.name = name.into();
            env.services.stores.skus.insert(s).await.unwrap();
        }
        assert_eq!(manager.generate_name("flavor").await.unwrap(), "flavor-2");
        assert_eq!(manager.generate_name("other").await.unwrap(), "other");
    }

    #[test]
    fn malformed_error_is_validation() {
        let region = RegionId::from_ulid(Ulid::new());
        let s = sku(PROVIDER_ALIYUN, region, 0, 0);
        assert!(matches!(
            s.compare_key(),
            Err(CumulusError::Validation(ValidationError::InputParameter(_)))
        ));
    }
}
