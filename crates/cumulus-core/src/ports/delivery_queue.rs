//! DeliveryQueue port - stage の配送キュー
//!
//! キューは StageEnvelope（task id + stage 世代 + data）だけを流します。
//! タスクの状態は Model Store の TaskRecord が正本。

use crate::domain::StageEnvelope;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn push(&self, envelope: StageEnvelope) -> Result<(), QueueError>;

    /// timeout までに何も来なければ None
    async fn pop(&self, timeout: Duration) -> Result<Option<StageEnvelope>, QueueError>;

    async fn len(&self) -> usize;
}
