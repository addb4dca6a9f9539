//! ServerSku - インスタンスタイプ（cpu/mem/disk/nic/gpu の組み合わせ）
//!
//! OneCloud（ローカル）の SKU は `ecs.<family>.c<cpu>m<mem/1024>` で自動命名され、
//! 外部プロバイダの SKU はカタログの 1 エントリと 1:1 に対応します。

use super::errors::{Result, ValidationError};
use super::ids::{RegionId, Sku, SkuId};
use super::model::Model;
use serde::{Deserialize, Serialize};

pub const PROVIDER_ONECLOUD: &str = "OneCloud";
pub const PROVIDER_VMWARE: &str = "VMware";
pub const PROVIDER_OPENSTACK: &str = "OpenStack";
pub const PROVIDER_ZSTACK: &str = "ZStack";
pub const PROVIDER_ALIYUN: &str = "Aliyun";
pub const PROVIDER_AWS: &str = "Aws";
pub const PROVIDER_AZURE: &str = "Azure";
pub const PROVIDER_QCLOUD: &str = "Qcloud";
pub const PROVIDER_HUAWEI: &str = "Huawei";
pub const PROVIDER_GOOGLE: &str = "Google";

/// 既知のプロバイダ（大文字小文字の正規化に使う）
pub const CLOUD_PROVIDERS: &[&str] = &[
    PROVIDER_ONECLOUD,
    PROVIDER_VMWARE,
    PROVIDER_OPENSTACK,
    PROVIDER_ZSTACK,
    PROVIDER_ALIYUN,
    PROVIDER_AWS,
    PROVIDER_AZURE,
    PROVIDER_QCLOUD,
    PROVIDER_HUAWEI,
    PROVIDER_GOOGLE,
];

pub const PUBLIC_CLOUD_PROVIDERS: &[&str] = &[
    PROVIDER_ALIYUN,
    PROVIDER_AWS,
    PROVIDER_AZURE,
    PROVIDER_QCLOUD,
    PROVIDER_HUAWEI,
    PROVIDER_GOOGLE,
];

pub const CATEGORY_GENERAL_PURPOSE: &str = "general_purpose";
pub const CATEGORY_BURSTABLE: &str = "burstable";
pub const CATEGORY_COMPUTE_OPTIMIZED: &str = "compute_optimized";
pub const CATEGORY_MEMORY_OPTIMIZED: &str = "memory_optimized";
pub const CATEGORY_STORAGE_OPTIMIZED: &str = "storage_optimized";
pub const CATEGORY_HARDWARE_ACCELERATED: &str = "hardware_accelerated";

/// category → instance type family
pub const SKU_FAMILIES: &[(&str, &str)] = &[
    (CATEGORY_GENERAL_PURPOSE, "g1"),
    (CATEGORY_BURSTABLE, "t1"),
    (CATEGORY_COMPUTE_OPTIMIZED, "c1"),
    (CATEGORY_MEMORY_OPTIMIZED, "r1"),
    (CATEGORY_STORAGE_OPTIMIZED, "i1"),
    (CATEGORY_HARDWARE_ACCELERATED, "gn1"),
];

pub fn family_of(category: &str) -> Option<&'static str> {
    SKU_FAMILIES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, family)| *family)
}

pub fn is_public_cloud(provider: &str) -> bool {
    PUBLIC_CLOUD_PROVIDERS.contains(&provider)
}

/// 販売状態（prepaid / postpaid それぞれ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    #[default]
    Available,
    Soldout,
}

impl SaleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Soldout => "soldout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuStatus {
    #[default]
    Ready,
    Deleting,
    DeleteFailed,
}

impl SkuStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Deleting => "deleting",
            Self::DeleteFailed => "delete_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSku {
    pub id: SkuId,
    pub name: String,
    pub provider: String,
    pub cloudregion_id: RegionId,
    pub zone_id: Option<String>,
    pub external_id: Option<String>,

    pub cpu_core_count: u32,
    pub memory_size_mb: u32,

    pub prepaid_status: SaleStatus,
    pub postpaid_status: SaleStatus,
    pub enabled: bool,
    pub status: SkuStatus,
    pub status_reason: Option<String>,

    pub instance_type_family: String,
    pub instance_type_category: String,
    pub local_category: String,

    #[serde(flatten)]
    pub spec: SkuSpec,
}

/// ディスク・NIC・GPU など、カタログから丸ごと写す属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuSpec {
    pub os_name: String,

    pub sys_disk_resizable: bool,
    pub sys_disk_type: String,
    pub sys_disk_min_size_gb: u32,
    pub sys_disk_max_size_gb: u32,

    pub attached_disk_type: String,
    pub attached_disk_size_gb: u32,
    pub attached_disk_count: u32,

    pub data_disk_types: String,
    pub data_disk_max_count: u32,

    pub nic_type: String,
    pub nic_max_count: u32,

    pub gpu_attachable: bool,
    pub gpu_spec: String,
    pub gpu_count: u32,
    pub gpu_max_count: u32,
}

impl Default for SkuSpec {
    fn default() -> Self {
        Self {
            os_name: "Any".to_string(),
            sys_disk_resizable: true,
            sys_disk_type: String::new(),
            sys_disk_min_size_gb: 0,
            sys_disk_max_size_gb: 0,
            attached_disk_type: String::new(),
            attached_disk_size_gb: 0,
            attached_disk_count: 0,
            data_disk_types: String::new(),
            data_disk_max_count: 0,
            nic_type: String::new(),
            nic_max_count: 1,
            gpu_attachable: true,
            gpu_spec: String::new(),
            gpu_count: 0,
            gpu_max_count: 0,
        }
    }
}

impl ServerSku {
    /// 最小限の属性で SKU を作る（その他はデフォルト値）
    pub fn new(
        id: SkuId,
        name: impl Into<String>,
        provider: impl Into<String>,
        cloudregion_id: RegionId,
        cpu_core_count: u32,
        memory_size_mb: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            provider: provider.into(),
            cloudregion_id,
            zone_id: None,
            external_id: None,
            cpu_core_count,
            memory_size_mb,
            prepaid_status: SaleStatus::Available,
            postpaid_status: SaleStatus::Available,
            enabled: true,
            status: SkuStatus::Ready,
            status_reason: None,
            instance_type_family: String::new(),
            instance_type_category: String::new(),
            local_category: String::new(),
            spec: SkuSpec::default(),
        }
    }

    pub fn is_onecloud(&self) -> bool {
        self.provider == PROVIDER_ONECLOUD
    }

    pub fn is_soldout(&self) -> bool {
        self.prepaid_status == SaleStatus::Soldout && self.postpaid_status == SaleStatus::Soldout
    }

    /// private cloud 同期で使う "cpu/mem" キー
    pub fn shape_key(&self) -> String {
        shape_key(self.cpu_core_count, self.memory_size_mb)
    }
}

pub fn shape_key(cpu: u32, memory_mb: u32) -> String {
    format!("{cpu}/{memory_mb}")
}

impl Model for ServerSku {
    type Marker = Sku;

    const KEYWORD: &'static str = "serversku";

    fn id(&self) -> SkuId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// OneCloud SKU の名前を生成する: `ecs.<family>.c<cpu>m<mem/1024>`
pub fn gen_instance_type(family: &str, cpu: u32, memory_mb: u32) -> Result<String> {
    if cpu == 0 {
        return Err(
            ValidationError::OutOfRange("cpu_core_count should great than zero".into()).into(),
        );
    }
    if memory_mb == 0 || memory_mb % 1024 != 0 {
        return Err(ValidationError::OutOfRange(
            "memory_size_mb should great than zero. and should be integral multiple of 1024"
                .into(),
        )
        .into());
    }
    Ok(format!("ecs.{family}.c{cpu}m{}", memory_mb / 1024))
}
