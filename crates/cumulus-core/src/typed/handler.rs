//! DynTask - Task の型消去
//!
//! # 学習ポイント
//! - ジェネリック trait (Task) → object-safe trait (DynTask)
//! - Type erasure パターン (TypedTask<T> → Arc<dyn DynTask>)

use super::task::{StageName, Task};
use crate::app::TaskContext;
use crate::domain::{CumulusError, DispatchKind, Result};
use async_trait::async_trait;
use serde_json::Value;

/// DynTask は object-safe な Task の抽象化
///
/// TaskRegistry は `HashMap<String, Arc<dyn DynTask>>` でタスクを管理します。
#[async_trait]
pub trait DynTask: Send + Sync {
    fn kind(&self) -> &'static str;

    fn init_stage(&self) -> &'static str;

    fn has_stage(&self, stage: &str) -> bool;

    /// record の現在の stage を解決して callback を呼ぶ
    async fn dispatch(&self, ctx: &mut TaskContext, kind: DispatchKind, data: Value)
    -> Result<()>;
}

pub struct TypedTask<T: Task> {
    task: T,
}

impl<T: Task> TypedTask<T> {
    pub fn new(task: T) -> Self {
        Self { task }
    }
}

#[async_trait]
impl<T: Task> DynTask for TypedTask<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn init_stage(&self) -> &'static str {
        T::INIT.as_str()
    }

    fn has_stage(&self, stage: &str) -> bool {
        T::Stage::from_name(stage).is_some()
    }

    async fn dispatch(
        &self,
        ctx: &mut TaskContext,
        kind: DispatchKind,
        data: Value,
    ) -> Result<()> {
        let current = ctx.record().stage.clone();
        let stage = T::Stage::from_name(&current).ok_or_else(|| CumulusError::UnknownStage {
            kind: T::KIND.to_string(),
            stage: current,
        })?;

        match kind {
            DispatchKind::Stage => self.task.on_stage(stage, ctx, data).await,
            DispatchKind::StageFailed => {
                let reason = match data {
                    Value::String(reason) => reason,
                    other => other.to_string(),
                };
                self.task.on_stage_failed(stage, ctx, reason).await
            }
        }
    }
}
