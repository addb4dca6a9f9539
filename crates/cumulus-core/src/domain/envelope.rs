//! StageEnvelope - DeliveryQueue に流す配送単位
//!
//! envelope は「どのタスクの、どの stage 世代を、どう呼ぶか」だけを持つ。
//! タスクの状態そのものは Model Store の `TaskRecord` が正本。

use super::ids::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// 通常の stage callback
    Stage,
    /// stage の失敗 callback（data は理由の文字列）
    StageFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEnvelope {
    pub task_id: TaskId,
    /// `TaskRecord::stage_seq` の値。古い世代の envelope は捨てられる
    pub stage_seq: u64,
    pub kind: DispatchKind,
    pub data: Value,
}

impl StageEnvelope {
    pub fn stage(task_id: TaskId, stage_seq: u64, data: Value) -> Self {
        Self {
            task_id,
            stage_seq,
            kind: DispatchKind::Stage,
            data,
        }
    }

    pub fn failed(task_id: TaskId, stage_seq: u64, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            stage_seq,
            kind: DispatchKind::StageFailed,
            data: Value::String(reason.into()),
        }
    }

    /// StageFailed の理由（data が文字列でなければ JSON 表現）
    pub fn reason(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
