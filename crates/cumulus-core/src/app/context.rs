//! TaskContext / TaskCallback - stage callback から見たタスク
//!
//! callback は `TaskContext` 上の record を変更し、エンジンは callback の終了後に
//! record を永続化してから、溜まった配送（continue_with）をキューに流します。

use super::engine::{TaskEngine, into_params};
use crate::domain::{
    ParentLink, Result, StageEnvelope, TargetRef, TaskId, TaskRecord, UserCred,
};
use crate::typed::StageName;
use serde_json::{Map, Value};

pub struct TaskContext {
    engine: TaskEngine,
    record: TaskRecord,
    pending: Vec<StageEnvelope>,
}

impl TaskContext {
    pub(crate) fn new(engine: TaskEngine, record: TaskRecord) -> Self {
        Self {
            engine,
            record,
            pending: Vec::new(),
        }
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn task_id(&self) -> TaskId {
        self.record.id
    }

    pub fn target(&self) -> TargetRef {
        self.record.target
    }

    pub fn user_cred(&self) -> &UserCred {
        &self.record.user_cred
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.record.params
    }

    pub fn is_subtask(&self) -> bool {
        self.record.is_subtask()
    }

    /// 次の stage に進む（配送は外部の callback や子タスクに任せる）
    pub fn set_stage(&mut self, stage: impl StageName) -> Result<()> {
        let now = self.engine.now();
        self.record.enter_stage(stage.as_str(), now)?;
        tracing::debug!(
            task_id = %self.record.id,
            kind = %self.record.kind,
            stage = stage.as_str(),
            seq = self.record.stage_seq,
            "set stage"
        );
        Ok(())
    }

    /// 次の stage に進み、data 付きで即座に配送する
    pub fn continue_with(&mut self, stage: impl StageName, data: Value) -> Result<()> {
        self.set_stage(stage)?;
        self.pending.push(StageEnvelope::stage(
            self.record.id,
            self.record.stage_seq,
            data,
        ));
        Ok(())
    }

    /// 現在の stage 世代に結び付いた callback（driver に渡す）
    pub fn callback(&self) -> TaskCallback {
        TaskCallback {
            engine: self.engine.clone(),
            task_id: self.record.id,
            stage_seq: self.record.stage_seq,
        }
    }

    pub fn set_stage_complete(&mut self, data: Value) -> Result<()> {
        let now = self.engine.now();
        let result = (!data.is_null()).then_some(data);
        self.record.complete(result, now)
    }

    pub fn set_stage_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        let now = self.engine.now();
        self.record.fail(reason, now)
    }

    /// 子タスクを作って起動する
    ///
    /// 子が終端に達すると、エンジンがこのタスクの現在の stage 世代に
    /// 完了（on_stage）または失敗（on_stage_failed）を配送します。
    /// 先に `set_stage` で待ち受ける stage に進んでから呼んでください。
    pub async fn spawn_subtask(
        &self,
        kind: &str,
        target: TargetRef,
        params: Value,
    ) -> Result<TaskId> {
        let mut params = into_params(params)?;
        params.insert("subtask".to_string(), Value::Bool(true));
        let parent = ParentLink {
            task_id: self.record.id,
            stage_seq: self.record.stage_seq,
        };
        self.engine
            .start_task(
                kind,
                target,
                self.record.user_cred.clone(),
                Value::Object(params),
                Some(parent),
            )
            .await
    }

    pub(crate) fn into_parts(self) -> (TaskRecord, Vec<StageEnvelope>) {
        (self.record, self.pending)
    }
}

/// 非同期 driver に渡す完了通知
///
/// 発行時の stage 世代を覚えているので、古い callback は無視されます。
#[derive(Clone)]
pub struct TaskCallback {
    engine: TaskEngine,
    task_id: TaskId,
    stage_seq: u64,
}

impl TaskCallback {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn stage_seq(&self) -> u64 {
        self.stage_seq
    }

    pub async fn complete(&self, data: Value) -> Result<()> {
        self.engine
            .enqueue(StageEnvelope::stage(self.task_id, self.stage_seq, data))
            .await
    }

    pub async fn fail(&self, reason: impl Into<String>) -> Result<()> {
        let envelope = StageEnvelope::failed(self.task_id, self.stage_seq, reason);
        self.engine.enqueue(envelope).await
    }
}
