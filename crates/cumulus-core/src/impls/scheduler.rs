//! TracingSchedulerClient - スケジューラへの通知をログに出すだけの実装

use crate::domain::{HostId, Result};
use crate::ports::SchedulerClient;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct TracingSchedulerClient;

#[async_trait]
impl SchedulerClient for TracingSchedulerClient {
    async fn clear_host_sched_desc_cache(&self, host_id: HostId) -> Result<()> {
        tracing::info!(%host_id, "scheduler: clear host description cache");
        Ok(())
    }

    async fn sync_skus(&self, wait: bool) -> Result<()> {
        tracing::info!(wait, "scheduler: sync skus");
        Ok(())
    }
}
