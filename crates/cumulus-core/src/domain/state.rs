//! State - タスクの状態
//!
//! タスクは常に {running-at-stage-X, complete, failed} のいずれか一つ。
//! stage 名は `TaskRecord::stage` が持つので、ここでは 3 状態のみ。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// `stage` の callback を待っている（または実行中）
    Running,
    /// 終端: 成功
    Complete,
    /// 終端: 失敗（`message` に理由）
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Running, false)]
    #[case(TaskState::Complete, true)]
    #[case(TaskState::Failed, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
