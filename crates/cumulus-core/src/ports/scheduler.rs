//! SchedulerClient port - スケジューラのキャッシュ無効化

use crate::domain::{HostId, Result};
use async_trait::async_trait;

#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// ホストの容量が変わったのでスケジューラの description cache を捨てる
    async fn clear_host_sched_desc_cache(&self, host_id: HostId) -> Result<()>;

    /// SKU 一覧をスケジューラに再同期させる
    async fn sync_skus(&self, wait: bool) -> Result<()>;
}
