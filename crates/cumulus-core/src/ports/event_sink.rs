//! EventSink port - 監査ログの記録先
//!
//! 記録の失敗でタスクを止めないため、emit は Result を返しません。

use crate::domain::DomainEvent;
use async_trait::async_trait;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent);
}
