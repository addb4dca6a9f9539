//! InMemoryDeliveryQueue - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio の Mutex + Notify による async な blocking pop
//! - `notified()` をキュー確認の前に作ることで、push の取りこぼしを防ぐ

use crate::domain::StageEnvelope;
use crate::ports::{DeliveryQueue, QueueError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

pub struct InMemoryDeliveryQueue {
    queue: Mutex<VecDeque<StageEnvelope>>,
    notify: Notify,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn push(&self, envelope: StageEnvelope) -> Result<(), QueueError> {
        self.queue.lock().await.push_back(envelope);
        // 待機中の pop を 1 つ起こす（誰もいなければ permit が残る）
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<StageEnvelope>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(envelope) = self.queue.lock().await.pop_front() {
                return Ok(Some(envelope));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use serde_json::json;
    use std::sync::Arc;
    use ulid::Ulid;

    fn envelope(seq: u64) -> StageEnvelope {
        StageEnvelope::stage(TaskId::from_ulid(Ulid::new()), seq, json!({}))
    }

    #[tokio::test]
    async fn push_pop_is_fifo() {
        let queue = InMemoryDeliveryQueue::new();
        queue.push(envelope(1)).await.unwrap();
        queue.push(envelope(2)).await.unwrap();
        assert_eq!(queue.len().await, 2);

        let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!((first.stage_seq, second.stage_seq), (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out() {
        let queue = InMemoryDeliveryQueue::new();
        let start = Instant::now();
        let popped = queue.pop(Duration::from_millis(500)).await.unwrap();
        assert!(popped.is_none());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn push_wakes_pop() {
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop(Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let env = envelope(7);
        queue.push(env.clone()).await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some(env));
    }
}
