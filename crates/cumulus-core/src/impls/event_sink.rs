//! EventSink の実装
//!
//! - **TracingEventSink**: tracing のイベントとして出力（本番・CLI 用）
//! - **MemoryEventSink**: メモリに溜める（テスト用）

use crate::domain::{Action, DomainEvent};
use crate::ports::EventSink;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: DomainEvent) {
        match &event {
            DomainEvent::OpsLog {
                object,
                action,
                notes,
                user,
            } => tracing::info!(
                target: "cumulus::audit",
                log = "ops",
                keyword = object.keyword,
                id = %object.id,
                name = %object.name,
                action = %action,
                user = %user,
                "{notes}"
            ),
            DomainEvent::ActionLog {
                object,
                action,
                notes,
                user,
                success,
            } => tracing::info!(
                target: "cumulus::audit",
                log = "action",
                keyword = object.keyword,
                id = %object.id,
                name = %object.name,
                action = %action,
                user = %user,
                success = *success,
                "{notes}"
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }

    /// 指定オブジェクト（Display 形式の id）に記録された action の一覧
    pub async fn actions_for(&self, object_id: &str) -> Vec<Action> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.object().id == object_id)
            .map(DomainEvent::action)
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: DomainEvent) {
        self.events.lock().await.push(event);
    }
}
