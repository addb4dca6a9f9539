//! Instance specs - 作成画面に出す cpu / メモリの選択肢
//!
//! SKU を (cpu, memory) 昇順に並べて走査し、メモリは GB 単位に丸めて集計します。
//! 結果は query ごとの cache key で HashCache に載せます。

use super::manager::ServerSkuManager;
use crate::domain::sku::{CLOUD_PROVIDERS, is_public_cloud};
use crate::domain::{Result, SaleStatus, ServerSku};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const INSTANCE_SPECS_CACHE_PREFIX: &str = "InstanceSpecs_";

/// 四捨五入で step（> 0）の倍数に丸める。u32 に収まらなければ収まる最大の倍数
pub fn round(n: u32, step: u32) -> u32 {
    let r = (2 * u64::from(n) + u64::from(step)) / (2 * u64::from(step)) * u64::from(step);
    u32::try_from(r).unwrap_or(u32::MAX - u32::MAX % step)
}

/// メモリを GB 単位に丸める（512 以下は 512）
pub fn round_mem(n: u32) -> u32 {
    if n <= 512 {
        return 512;
    }
    round(n, 1024)
}

/// メモリ検索の区間 `(start, end]`。512 以下は `[0, 512]`、それ以外は丸めた値 r に対して `(r - 512, r]`
pub fn interval_mem(n: u32) -> (u32, u32) {
    if n <= 512 {
        return (0, 512);
    }
    let r = round_mem(n);
    (r - 512, r)
}

/// 大文字小文字を無視して既知の provider 名にそろえる（未知ならそのまま）
pub fn normalize_provider(provider: &str) -> String {
    CLOUD_PROVIDERS
        .iter()
        .find(|p| p.eq_ignore_ascii_case(provider))
        .map_or_else(|| provider.to_string(), |p| p.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSpecQuery {
    pub provider: String,
    pub public_cloud: bool,
    pub zone_id: String,
    pub postpaid_status: Option<SaleStatus>,
    pub prepaid_status: Option<SaleStatus>,
    /// このメモリに丸められる SKU だけ
    pub memory_size_mb: Option<u32>,
    pub cpu_core_count: Vec<u32>,
    /// 有効な SKU だけ
    pub usable: bool,
    pub ignore_cache: bool,
}

impl InstanceSpecQuery {
    /// provider を正規化し、public cloud の provider なら public_cloud を立てる
    pub fn normalized(mut self) -> Self {
        self.provider = normalize_provider(&self.provider);
        if is_public_cloud(&self.provider) {
            self.public_cloud = true;
        }
        self
    }

    /// cache key に含まれない絞り込みがあるときはキャッシュを使わない
    pub fn is_cacheable(&self) -> bool {
        self.memory_size_mb.is_none() && self.cpu_core_count.is_empty() && !self.usable
    }

    pub fn cache_key(&self) -> String {
        let raw = format!(
            "{}:{}:{}:{}:{}",
            self.provider,
            self.public_cloud,
            self.zone_id,
            self.postpaid_status.map_or("", SaleStatus::as_str),
            self.prepaid_status.map_or("", SaleStatus::as_str),
        );
        let digest = Md5::digest(raw.as_bytes());
        format!("{INSTANCE_SPECS_CACHE_PREFIX}{digest:x}")
    }

    pub fn matches(&self, sku: &ServerSku) -> bool {
        if !self.provider.is_empty() && sku.provider != self.provider {
            return false;
        }
        if self.public_cloud && !is_public_cloud(&sku.provider) {
            return false;
        }
        if !self.zone_id.is_empty() && sku.zone_id.as_deref() != Some(self.zone_id.as_str()) {
            return false;
        }
        if self.postpaid_status.is_some_and(|s| s != sku.postpaid_status) {
            return false;
        }
        if self.prepaid_status.is_some_and(|s| s != sku.prepaid_status) {
            return false;
        }
        if let Some(mem) = self.memory_size_mb {
            let (start, end) = interval_mem(mem);
            if !(start < sku.memory_size_mb && sku.memory_size_mb <= end) {
                return false;
            }
        }
        if !self.cpu_core_count.is_empty() && !self.cpu_core_count.contains(&sku.cpu_core_count) {
            return false;
        }
        !self.usable || sku.enabled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpecs {
    pub cpus: Vec<u32>,
    pub mems_mb: Vec<u32>,
    /// cpu（文字列）→ 丸めたメモリ一覧
    pub cpu_mems_mb: BTreeMap<String, Vec<u32>>,
}

impl InstanceSpecs {
    pub fn collect<'a>(skus: impl IntoIterator<Item = &'a ServerSku>) -> Self {
        let mut shapes: Vec<(u32, u32)> = skus
            .into_iter()
            .map(|s| (s.cpu_core_count, s.memory_size_mb))
            .collect();
        shapes.sort_unstable();
        shapes.dedup();

        let mut specs = Self::default();
        let mut seen_mems = HashSet::new();
        let mut last_cpu = 0;
        for (cpu, mem) in shapes {
            let mem = round_mem(mem);
            if cpu > last_cpu {
                specs.cpus.push(cpu);
                last_cpu = cpu;
            }
            if seen_mems.insert(mem) {
                specs.mems_mb.push(mem);
            }
            let mems = specs.cpu_mems_mb.entry(cpu.to_string()).or_default();
            if mems.last() != Some(&mem) {
                mems.push(mem);
            }
        }
        specs.mems_mb.sort_unstable();
        specs
    }
}

impl ServerSkuManager {
    pub async fn get_property_instance_specs(
        &self,
        query: InstanceSpecQuery,
    ) -> Result<InstanceSpecs> {
        let query = query.normalized();
        let key = query.cache_key();
        let cache = &self.services().cache;
        let cacheable = query.is_cacheable();
        if cacheable && !query.ignore_cache {
            if let Some(specs) = cache.get_as::<InstanceSpecs>(&key).await {
                tracing::debug!(key = %key, "instance specs served from cache");
                return Ok(specs);
            }
        }

        let skus = self
            .services()
            .stores
            .skus
            .query(&|s: &ServerSku| query.matches(s))
            .await?;
        let specs = InstanceSpecs::collect(&skus);
        if cacheable {
            cache.set_as(key, &specs).await;
        }
        Ok(specs)
    }

    /// SKU が変わったら instance specs のキャッシュをまとめて捨てる
    pub async fn invalidate_instance_specs(&self) {
        self.services()
            .cache
            .remove_prefix(INSTANCE_SPECS_CACHE_PREFIX)
            .await;
    }
}
