//! ServerSkuManager - SKU の作成・更新・削除・照会
//!
//! SKU を変更する API はここに集めます。同期（sync.rs）と instance specs（specs.rs）も
//! 同じ型に `impl` を足す形で実装しています。

use crate::app::TaskEngine;
use crate::domain::sku::{
    CATEGORY_GENERAL_PURPOSE, PROVIDER_ONECLOUD, PROVIDER_VMWARE, SKU_FAMILIES, family_of,
    gen_instance_type, is_public_cloud,
};
use crate::domain::{
    Action, Cloudregion, CumulusError, Guest, Host, Model, RegionId, Result, SaleStatus,
    ServerSku, SkuId, SkuSpec, SkuStatus, TaskId, UserCred, ValidationError,
};
use crate::services::Services;
use crate::tasks::{start_server_sku_cache_task, start_server_sku_delete_task};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const MIN_CPU: u32 = 1;
const MAX_CPU: u32 = 256;
const MIN_MEMORY_MB: u32 = 512;
const MAX_MEMORY_MB: u32 = 512 * 1024;

/// 初期データ: (cpu, memory GB)
const DEFAULT_SHAPES: &[(u32, u32)] = &[
    (1, 1), (1, 2), (1, 4), (1, 8),
    (2, 2), (2, 4), (2, 8), (2, 12), (2, 16),
    (4, 4), (4, 8), (4, 12), (4, 16), (4, 24), (4, 32),
    (8, 8), (8, 12), (8, 16), (8, 24), (8, 32), (8, 64),
    (12, 12), (12, 16), (12, 24), (12, 32), (12, 64),
    (16, 16), (16, 24), (16, 32), (16, 48), (16, 64),
    (24, 24), (24, 32), (24, 48), (24, 64), (24, 128),
    (32, 32), (32, 48), (32, 64), (32, 128),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuCreateInput {
    /// 省略時は `ecs.<family>.c<cpu>m<mem>` を生成
    pub name: Option<String>,
    /// 省略時はデフォルトリージョン
    pub cloudregion_id: Option<RegionId>,
    pub zone_id: Option<String>,
    pub cpu_core_count: u32,
    pub memory_size_mb: u32,
    pub instance_type_category: Option<String>,
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub spec: SkuSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuUpdateInput {
    pub name: Option<String>,
    pub prepaid_status: Option<SaleStatus>,
    pub postpaid_status: Option<SaleStatus>,
    pub sys_disk_type: Option<String>,
    pub data_disk_types: Option<String>,
}

/// 一覧表示用の行（SKU + 利用中の guest 数）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSkuDetails {
    #[serde(flatten)]
    pub sku: ServerSku,
    pub total_guest_count: usize,
}

#[derive(Clone)]
pub struct ServerSkuManager {
    services: Arc<Services>,
}

fn guest_count_key(id: SkuId) -> String {
    format!("{id}.total_guest_count")
}

impl ServerSkuManager {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// OneCloud と設定された private cloud だけ SKU を更新・削除できる
    pub fn is_mutable_provider(&self, provider: &str) -> bool {
        provider == PROVIDER_ONECLOUD || self.services.config.sku.is_private_cloud(provider)
    }

    pub async fn default_region(&self) -> Result<Cloudregion> {
        let name = &self.services.config.sku.default_region_name;
        self.services
            .stores
            .regions
            .query(&|r: &Cloudregion| &r.name == name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CumulusError::not_found(Cloudregion::KEYWORD, name))
    }

    pub async fn ensure_default_region(&self) -> Result<Cloudregion> {
        match self.default_region().await {
            Ok(region) => Ok(region),
            Err(err) if err.is_not_found() => {
                let name = self.services.config.sku.default_region_name.clone();
                let region = Cloudregion {
                    id: self.services.ids.generate(),
                    external_id: name.clone(),
                    name,
                    provider: PROVIDER_ONECLOUD.to_string(),
                    manager_id: None,
                };
                tracing::info!(region = %region.name, "created default region");
                self.services.stores.regions.insert(region).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn validate_create_data(&self, input: SkuCreateInput) -> Result<ServerSku> {
        let region = match input.cloudregion_id {
            Some(id) => self.services.stores.regions.get(id).await?,
            None => self.default_region().await?,
        };

        if !(MIN_CPU..=MAX_CPU).contains(&input.cpu_core_count) {
            return Err(ValidationError::OutOfRange(format!(
                "cpu_core_count should be range of {MIN_CPU}~{MAX_CPU}"
            ))
            .into());
        }
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&input.memory_size_mb) {
            return Err(ValidationError::OutOfRange(format!(
                "memory_size_mb should be range of {MIN_MEMORY_MB}~{MAX_MEMORY_MB}"
            ))
            .into());
        }

        let category = input
            .instance_type_category
            .unwrap_or_else(|| CATEGORY_GENERAL_PURPOSE.to_string());
        let family = family_of(&category).ok_or_else(|| {
            let known: Vec<&str> = SKU_FAMILIES.iter().map(|(c, _)| *c).collect();
            ValidationError::InputParameter(format!(
                "instance_type_category should be one of {known:?}"
            ))
        })?;

        let name = match input.name.filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => {
                let name = gen_instance_type(family, input.cpu_core_count, input.memory_size_mb)?;
                let count = self
                    .services
                    .stores
                    .skus
                    .count(&|s: &ServerSku| s.name == name)
                    .await?;
                if count > 0 {
                    return Err(ValidationError::Duplicate(format!("Duplicate sku {name}")).into());
                }
                name
            }
        };

        let mut sku = ServerSku::new(
            self.services.ids.generate(),
            name,
            PROVIDER_ONECLOUD,
            region.id,
            input.cpu_core_count,
            input.memory_size_mb,
        );
        sku.zone_id = input.zone_id;
        sku.enabled = input.enabled.unwrap_or(true);
        sku.status = SkuStatus::Ready;
        sku.instance_type_family = family.to_string();
        sku.local_category = category.clone();
        sku.instance_type_category = category;
        sku.spec = input.spec;
        Ok(sku)
    }

    pub async fn create(&self, cred: &UserCred, input: SkuCreateInput) -> Result<ServerSku> {
        let sku = self.validate_create_data(input).await?;
        let sku = self.services.stores.skus.insert(sku).await?;
        self.services
            .ops_log(
                &sku,
                Action::Create,
                format!("{}/{}", sku.cpu_core_count, sku.memory_size_mb),
                cred,
            )
            .await;
        self.invalidate_instance_specs().await;
        tracing::info!(sku = %sku.name, sku_id = %sku.id, "server sku created");
        Ok(sku)
    }

    pub fn validate_update_data(&self, sku: &ServerSku, input: &SkuUpdateInput) -> Result<()> {
        if !self.is_mutable_provider(&sku.provider) {
            return Err(ValidationError::Forbidden(format!(
                "can not update instance_type for public cloud {}",
                sku.provider
            ))
            .into());
        }
        if input.name.as_deref().is_some_and(|n| !n.is_empty()) {
            return Err(
                ValidationError::UnsupportedOperation("Cannot change server sku name".into())
                    .into(),
            );
        }
        Ok(())
    }

    pub async fn update(
        &self,
        cred: &UserCred,
        id: SkuId,
        input: SkuUpdateInput,
    ) -> Result<ServerSku> {
        let sku = self.services.stores.skus.get(id).await?;
        self.validate_update_data(&sku, &input)?;

        let (sku, diff) = self
            .services
            .stores
            .skus
            .update_with_lock(
                id,
                Box::new(move |s: &mut ServerSku| {
                    if let Some(status) = input.prepaid_status {
                        s.prepaid_status = status;
                    }
                    if let Some(status) = input.postpaid_status {
                        s.postpaid_status = status;
                    }
                    if let Some(disk) = input.sys_disk_type {
                        s.spec.sys_disk_type = disk;
                    }
                    if let Some(disks) = input.data_disk_types {
                        s.spec.data_disk_types = disks;
                    }
                }),
            )
            .await?;
        if !diff.is_empty() {
            self.services
                .ops_log(&sku, Action::Update, diff.fields().join(","), cred)
                .await;
            self.invalidate_instance_specs().await;
        }
        Ok(sku)
    }

    /// この SKU（instance_type = name）を使っている guest 数
    ///
    /// zone を持つ SKU は、その zone のホスト上の guest だけを数えます。
    async fn related_guest_count(&self, sku: &ServerSku) -> Result<usize> {
        let stores = &self.services.stores;
        let name = sku.name.as_str();
        match sku.zone_id.as_deref() {
            Some(zone) => {
                let hosts: HashSet<_> = stores
                    .hosts
                    .query(&|h: &Host| h.zone_id.as_deref() == Some(zone))
                    .await?
                    .into_iter()
                    .map(|h| h.id)
                    .collect();
                stores
                    .guests
                    .count(&|g: &Guest| {
                        g.instance_type == name && g.host_id.is_some_and(|h| hosts.contains(&h))
                    })
                    .await
            }
            None => stores.guests.count(&|g: &Guest| g.instance_type == name).await,
        }
    }

    /// キャッシュ付きの guest 数（`<sku id>.total_guest_count`）
    pub async fn total_guest_count(&self, sku: &ServerSku) -> Result<usize> {
        let key = guest_count_key(sku.id);
        if let Some(count) = self.services.cache.get_as::<usize>(&key).await {
            return Ok(count);
        }
        let count = self.related_guest_count(sku).await?;
        self.services.cache.set_as(key, &count).await;
        Ok(count)
    }

    /// リージョンの SKU 一覧に guest 数を付けて返す
    pub async fn fetch_sku_details(&self, region_id: RegionId) -> Result<Vec<ServerSkuDetails>> {
        let skus = self.fetch_skus_by_region(region_id).await?;
        let mut rows = Vec::with_capacity(skus.len());
        for sku in skus {
            let total_guest_count = self.total_guest_count(&sku).await?;
            rows.push(ServerSkuDetails {
                sku,
                total_guest_count,
            });
        }
        Ok(rows)
    }

    /// guest の追加・削除で instance_type の guest 数キャッシュを捨てる
    pub async fn invalidate_guest_count(&self, instance_type: &str) -> Result<()> {
        let skus = self
            .services
            .stores
            .skus
            .query(&|s: &ServerSku| s.name == instance_type)
            .await?;
        for sku in skus {
            self.services.cache.remove(&guest_count_key(sku.id)).await;
        }
        Ok(())
    }

    pub async fn validate_delete_condition(&self, sku: &ServerSku) -> Result<()> {
        let count = self.related_guest_count(sku).await?;
        if count > 0 {
            return Err(ValidationError::NotEmpty(format!(
                "not allowed to delete an instance_type in use, remove related servers first: {}",
                sku.name
            ))
            .into());
        }
        if !self.is_mutable_provider(&sku.provider) {
            return Err(ValidationError::Forbidden(format!(
                "not allowed to delete public cloud instance_type: {}",
                sku.name
            ))
            .into());
        }
        Ok(())
    }

    /// 削除条件を確認して ServerSkuDeleteTask を起動する
    pub async fn delete(
        &self,
        engine: &TaskEngine,
        cred: &UserCred,
        id: SkuId,
        purge: bool,
    ) -> Result<TaskId> {
        let sku = self.services.stores.skus.get(id).await?;
        self.validate_delete_condition(&sku).await?;
        start_server_sku_delete_task(engine, &self.services, cred.clone(), id, purge).await
    }

    /// 行を消す（タスクから呼ばれる）
    pub async fn real_delete(&self, cred: &UserCred, sku: &ServerSku) -> Result<()> {
        if let Err(err) = self.services.scheduler.sync_skus(true).await {
            tracing::warn!(sku_id = %sku.id, error = %err, "scheduler sku sync failed");
        }
        self.services.stores.skus.mark_deleted(sku.id).await?;
        self.services.cache.remove(&guest_count_key(sku.id)).await;
        self.invalidate_instance_specs().await;
        self.services
            .ops_log(sku, Action::Delete, "", cred)
            .await;
        tracing::info!(sku = %sku.name, sku_id = %sku.id, "server sku deleted");
        Ok(())
    }

    async fn set_enabled(&self, cred: &UserCred, id: SkuId, enabled: bool) -> Result<ServerSku> {
        let sku = self.services.stores.skus.get(id).await?;
        if sku.enabled == enabled {
            return Ok(sku);
        }
        let (sku, _) = self
            .services
            .stores
            .skus
            .update_with_lock(id, Box::new(move |s: &mut ServerSku| s.enabled = enabled))
            .await?;
        let action = if enabled { Action::Enable } else { Action::Disable };
        self.services.ops_log(&sku, action, "", cred).await;
        self.services.action_log(&sku, action, "", cred, true).await;
        self.invalidate_instance_specs().await;
        Ok(sku)
    }

    pub async fn perform_enable(&self, cred: &UserCred, id: SkuId) -> Result<ServerSku> {
        self.set_enabled(cred, id, true).await
    }

    pub async fn perform_disable(&self, cred: &UserCred, id: SkuId) -> Result<ServerSku> {
        self.set_enabled(cred, id, false).await
    }

    pub async fn mark_as_soldout(&self, id: SkuId) -> Result<ServerSku> {
        let (sku, _) = self
            .services
            .stores
            .skus
            .update_with_lock(
                id,
                Box::new(|s: &mut ServerSku| {
                    s.prepaid_status = SaleStatus::Soldout;
                    s.postpaid_status = SaleStatus::Soldout;
                }),
            )
            .await?;
        Ok(sku)
    }

    /// 最初の失敗で止まる
    pub async fn mark_all_as_soldout(&self, ids: &[SkuId]) -> Result<()> {
        for id in ids {
            self.mark_as_soldout(*id).await?;
        }
        Ok(())
    }

    /// private cloud のリージョンに SKU（フレーバー）を作る
    pub async fn perform_cache_sku(
        &self,
        engine: &TaskEngine,
        cred: &UserCred,
        id: SkuId,
        region_id: RegionId,
    ) -> Result<TaskId> {
        self.services.stores.skus.get(id).await?;
        let region = self.services.stores.regions.get(region_id).await?;
        let manager_id = region.manager_id.ok_or_else(|| {
            ValidationError::InputParameter("Only support cache sku for private cloud".into())
        })?;
        let provider = self
            .services
            .stores
            .providers
            .fetch_by_id(manager_id)
            .await?
            .ok_or_else(|| {
                ValidationError::InputParameter(format!(
                    "failed to get cloudprovider for region {}({})",
                    region.name, region.id
                ))
            })?;
        if !provider.enabled {
            return Err(ValidationError::InputParameter(format!(
                "cloudprovider {}({}) disabled",
                provider.name, provider.id
            ))
            .into());
        }
        start_server_sku_cache_task(engine, cred.clone(), id, region.id).await
    }

    pub async fn fetch_skus_by_region(&self, region_id: RegionId) -> Result<Vec<ServerSku>> {
        self.services
            .stores
            .skus
            .query(&|s: &ServerSku| s.cloudregion_id == region_id)
            .await
    }

    /// zone 内で prepaid / postpaid のどちらかが販売中の SKU
    pub async fn fetch_all_available_sku_ids_by_zone(&self, zone_id: &str) -> Result<Vec<SkuId>> {
        if zone_id.is_empty() {
            return Err(
                ValidationError::InputParameter("zone id should not be empty".into()).into(),
            );
        }
        let skus = self
            .services
            .stores
            .skus
            .query(&|s: &ServerSku| {
                s.zone_id.as_deref() == Some(zone_id)
                    && (s.prepaid_status == SaleStatus::Available
                        || s.postpaid_status == SaleStatus::Available)
            })
            .await?;
        Ok(skus.into_iter().map(|s| s.id).collect())
    }

    /// cpu / memory が一致する postpaid 販売中の SKU
    ///
    /// private cloud のリージョンは、ローカル SKU のあるデフォルトリージョンで探します。
    pub async fn get_matched_sku(
        &self,
        region_id: RegionId,
        cpu: u32,
        memory_mb: u32,
    ) -> Result<ServerSku> {
        let region = self.services.stores.regions.get(region_id).await?;
        let region_id = if self.services.config.sku.is_private_cloud(&region.provider) {
            self.default_region().await?.id
        } else {
            region.id
        };
        self.services
            .stores
            .skus
            .query(&|s: &ServerSku| {
                s.cpu_core_count == cpu
                    && s.memory_size_mb == memory_mb
                    && s.cloudregion_id == region_id
                    && s.postpaid_status == SaleStatus::Available
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CumulusError::not_found(
                    ServerSku::KEYWORD,
                    format!("{cpu}/{memory_mb}@{region_id}"),
                )
            })
    }

    /// name と provider で SKU を引く
    ///
    /// OneCloud と VMware はローカル SKU、private cloud はローカルか自分の SKU。
    /// `check_consistency` のとき、同名で cpu / memory の違う SKU があれば Duplicate。
    pub async fn fetch_sku_by_name_and_provider(
        &self,
        name: &str,
        provider: &str,
        check_consistency: bool,
    ) -> Result<ServerSku> {
        let private = self.services.config.sku.is_private_cloud(provider);
        let local_only = provider == PROVIDER_ONECLOUD || provider == PROVIDER_VMWARE;
        let skus = self
            .services
            .stores
            .skus
            .query(&|s: &ServerSku| {
                s.name == name
                    && if local_only {
                        s.provider == PROVIDER_ONECLOUD
                    } else if private {
                        s.provider == PROVIDER_ONECLOUD || s.provider == provider
                    } else {
                        s.provider == provider
                    }
            })
            .await?;

        let mut iter = skus.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| CumulusError::not_found(ServerSku::KEYWORD, name))?;
        if check_consistency {
            for other in iter {
                if other.cpu_core_count != first.cpu_core_count
                    || other.memory_size_mb != first.memory_size_mb
                {
                    tracing::error!(
                        sku = %name,
                        first = %first.id,
                        other = %other.id,
                        "inconsistent sku"
                    );
                    return Err(
                        ValidationError::Duplicate(format!("duplicate instanceType {name}")).into(),
                    );
                }
            }
        }
        Ok(first)
    }

    pub async fn get_skus(
        &self,
        provider: &str,
        cpu: u32,
        memory_mb: u32,
    ) -> Result<Vec<ServerSku>> {
        self.services
            .stores
            .skus
            .query(&|s: &ServerSku| {
                s.cpu_core_count == cpu
                    && s.memory_size_mb == memory_mb
                    && (s.provider == provider
                        || (provider == PROVIDER_ONECLOUD && s.provider.is_empty()))
            })
            .await
    }

    /// ローカル SKU の "cpu/memory" 一覧
    pub async fn get_one_cloud_skus(&self) -> Result<Vec<String>> {
        let skus = self
            .services
            .stores
            .skus
            .query(&|s: &ServerSku| s.provider == PROVIDER_ONECLOUD)
            .await?;
        Ok(skus.iter().map(ServerSku::shape_key).collect())
    }

    /// region を省略すると全 SKU
    pub async fn get_sku_count_by_region(&self, region_id: Option<RegionId>) -> Result<usize> {
        self.services
            .stores
            .skus
            .count(&|s: &ServerSku| region_id.is_none_or(|id| s.cloudregion_id == id))
            .await
    }

    pub async fn get_public_cloud_sku_count(&self) -> Result<usize> {
        self.services
            .stores
            .skus
            .count(&|s: &ServerSku| is_public_cloud(&s.provider))
            .await
    }

    /// 起動時の初期化
    ///
    /// - デフォルトリージョンにローカル SKU がなければ標準の組み合わせを入れる
    /// - local_category が空なら instance_type_category で埋める
    /// - private cloud の SKU はローカル SKU にそろえる
    /// - ready 以外の status を ready に戻す
    pub async fn initialize_data(&self) -> Result<()> {
        let region = self.ensure_default_region().await?;
        let skus = self.services.stores.skus.clone();

        let local = skus
            .count(&|s: &ServerSku| s.cloudregion_id == region.id && s.zone_id.is_none())
            .await?;
        if local == 0 {
            for &(cpu, mem_gb) in DEFAULT_SHAPES {
                let input = SkuCreateInput {
                    cloudregion_id: Some(region.id),
                    cpu_core_count: cpu,
                    memory_size_mb: mem_gb * 1024,
                    ..Default::default()
                };
                match self.validate_create_data(input).await {
                    Ok(sku) => {
                        skus.insert(sku).await?;
                    }
                    Err(err) => {
                        tracing::error!(
                            cpu,
                            mem_gb,
                            error = %err,
                            "failed to initialize local sku"
                        );
                    }
                }
            }
            tracing::info!(count = DEFAULT_SHAPES.len(), "seeded default server skus");
        }

        let uncategorized = skus
            .query(&|s: &ServerSku| s.local_category.is_empty() && s.zone_id.is_none())
            .await?;
        for sku in uncategorized {
            skus.update_with_lock(
                sku.id,
                Box::new(|s: &mut ServerSku| s.local_category = s.instance_type_category.clone()),
            )
            .await?;
        }

        let config = &self.services.config.sku;
        let private = skus
            .query(&|s: &ServerSku| s.provider.is_empty() || config.is_private_cloud(&s.provider))
            .await?;
        let region_id = region.id;
        for sku in private {
            skus.update_with_lock(
                sku.id,
                Box::new(move |s: &mut ServerSku| {
                    s.provider = PROVIDER_ONECLOUD.to_string();
                    s.cloudregion_id = region_id;
                    s.zone_id = None;
                }),
            )
            .await?;
        }

        let unsettled = skus
            .query(&|s: &ServerSku| s.status != SkuStatus::Ready)
            .await?;
        for sku in unsettled {
            skus.update_with_lock(sku.id, Box::new(|s: &mut ServerSku| s.status = SkuStatus::Ready))
                .await?;
        }
        Ok(())
    }
}
