//! Status - タスクの集計ビュー

use crate::domain::{TaskRecord, TaskState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.state {
                TaskState::Running => counts.running += 1,
                TaskState::Complete => counts.complete += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.running + self.complete + self.failed
    }
}
