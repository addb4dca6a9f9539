//! TaskRegistry - タスクの登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性

use super::handler::{DynTask, TypedTask};
use super::task::Task;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn DynTask>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Task kind '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn register<T: Task>(&mut self, task: T) -> Result<(), RegistryError> {
        let kind = T::KIND.to_string();
        if self.tasks.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.tasks.insert(kind, Arc::new(TypedTask::new(task)));
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn DynTask>> {
        self.tasks.get(kind).cloned()
    }

    /// 登録済みの kind（ソート済み）
    pub fn registered_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.tasks.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fixtures::{EchoTask, TwoStageTask};

    #[test]
    fn register_and_get() {
        let mut registry = TaskRegistry::new();
        registry.register(EchoTask).unwrap();

        let task = registry.get(EchoTask::KIND).unwrap();
        assert_eq!(task.kind(), "EchoTask");
        assert_eq!(task.init_stage(), "init");
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register(EchoTask).unwrap();
        let result = registry.register(EchoTask);
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered(kind)) if kind == "EchoTask"
        ));
    }

    #[test]
    fn registered_kinds_are_sorted() {
        let mut registry = TaskRegistry::new();
        registry.register(TwoStageTask).unwrap();
        registry.register(EchoTask).unwrap();
        assert_eq!(registry.registered_kinds(), vec!["EchoTask", "TwoStageTask"]);

        let two = registry.get(TwoStageTask::KIND).unwrap();
        assert!(two.has_stage("on_second"));
        assert!(!two.has_stage("on_third"));
    }
}
