//! Config - 起動時の設定
//!
//! JSON ファイル（または文字列）から読み込みます。省略したセクション・項目はデフォルト値です。
//!
//! ```json
//! { "engine": { "workers": 8 }, "sku": { "lock_timeout_secs": 10 } }
//! ```

use crate::domain::sku::{PROVIDER_OPENSTACK, PROVIDER_ZSTACK};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub sku: SkuConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: usize,
    /// キューが空のときの待ち時間
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 200,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuConfig {
    /// ローカル（OneCloud）SKU を置くリージョンの name
    pub default_region_name: String,
    /// SKU の更新・削除を許可する private cloud
    pub private_cloud_providers: Vec<String>,
    pub lock_timeout_secs: u64,
}

impl Default for SkuConfig {
    fn default() -> Self {
        Self {
            default_region_name: "default".to_string(),
            private_cloud_providers: vec![
                PROVIDER_OPENSTACK.to_string(),
                PROVIDER_ZSTACK.to_string(),
            ],
            lock_timeout_secs: 30,
        }
    }
}

impl SkuConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn is_private_cloud(&self, provider: &str) -> bool {
        self.private_cloud_providers.iter().any(|p| p == provider)
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
