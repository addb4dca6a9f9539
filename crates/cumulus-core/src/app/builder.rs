//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! 起動時に「期待されるタスク種別 ⊆ 登録済み種別」を検査します（Fail-fast）。

use super::engine::TaskEngine;
use crate::domain::TaskRecord;
use crate::impls::{InMemoryDeliveryQueue, InMemoryModelStore};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, ModelStore, SystemClock, UlidGenerator};
use crate::typed::{RegistryError, Task, TaskRegistry};
use std::sync::Arc;

/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .register(GuestStopTask::new(services.clone()))?
///     .expect_tasks(&[GuestStopTask::KIND])
///     .build()?;
/// ```
pub struct EngineBuilder {
    registry: TaskRegistry,
    expected_tasks: Option<Vec<String>>,
    tasks: Option<Arc<dyn ModelStore<TaskRecord>>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task kinds: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            expected_tasks: None,
            tasks: None,
            queue: None,
            clock: None,
            ids: None,
        }
    }

    pub fn register<T: Task>(mut self, task: T) -> Result<Self, RegistryError> {
        self.registry.register(task)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, kinds: &[&str]) -> Self {
        self.expected_tasks = Some(kinds.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn with_task_store(mut self, tasks: Arc<dyn ModelStore<TaskRecord>>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 未指定の部品はインメモリ実装と SystemClock で埋める
    pub fn build(self) -> Result<TaskEngine, BuildError> {
        if let Some(expected) = &self.expected_tasks {
            let registered = self.registry.registered_kinds();
            let missing: Vec<String> = expected
                .iter()
                .filter(|k| !registered.contains(k))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let tasks = self
            .tasks
            .unwrap_or_else(|| Arc::new(InMemoryModelStore::<TaskRecord>::new()));
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryDeliveryQueue::new()));

        tracing::debug!(kinds = ?self.registry.registered_kinds(), "task engine built");
        Ok(TaskEngine::new(self.registry, tasks, queue, ids, clock))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fixtures::{EchoTask, TwoStageTask};

    #[test]
    fn build_success() {
        let engine = EngineBuilder::new()
            .register(EchoTask)
            .unwrap()
            .expect_tasks(&[EchoTask::KIND])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_missing_task_types() {
        let engine = EngineBuilder::new()
            .register(EchoTask)
            .unwrap()
            .expect_tasks(&[EchoTask::KIND, TwoStageTask::KIND])
            .build();
        assert!(matches!(
            engine,
            Err(BuildError::MissingTaskTypes(missing))
                if missing == vec![TwoStageTask::KIND.to_string()]
        ));
    }

    #[test]
    fn build_without_expectations() {
        let engine = EngineBuilder::default().register(EchoTask).unwrap().build();
        assert!(engine.is_ok());
    }

    #[test]
    fn double_register_is_an_error() {
        let result = EngineBuilder::new()
            .register(EchoTask)
            .unwrap()
            .register(EchoTask);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }
}
