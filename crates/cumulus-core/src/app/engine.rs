//! TaskEngine - タスク状態機械の実行エンジン
//!
//! # 実行フロー（execute）
//! 1. タスク単位のロックを取る（同じタスクの stage は並行に走らない）
//! 2. TaskRecord を読み、終端済み・古い世代・実行済み世代の envelope は捨てる
//! 3. stage 表から callback を引いて実行
//! 4. record を永続化してからロックを外し、溜まった配送をキューに流す
//! 5. 終端に達したら親タスクに継続を配送する
//!
//! エンジンはリトライしません。callback の `Err` はそのまま Failed になります。

use super::context::TaskContext;
use super::status::TaskCounts;
use crate::domain::{
    CumulusError, DispatchKind, ParentLink, Result, StageEnvelope, TargetRef, TaskId, TaskRecord,
    TaskState, UserCred,
};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, ModelStore};
use crate::typed::TaskRegistry;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 安価に clone できるエンジンのハンドル
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: TaskRegistry,
    tasks: Arc<dyn ModelStore<TaskRecord>>,
    queue: Arc<dyn DeliveryQueue>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    task_locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

/// タスクの params は JSON オブジェクト（null は空扱い）
pub(crate) fn into_params(params: Value) -> Result<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(CumulusError::internal(format!(
            "task params must be a JSON object, got {other}"
        ))),
    }
}

impl TaskEngine {
    pub(crate) fn new(
        registry: TaskRegistry,
        tasks: Arc<dyn ModelStore<TaskRecord>>,
        queue: Arc<dyn DeliveryQueue>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                tasks,
                queue,
                ids,
                clock,
                task_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn task_store(&self) -> Arc<dyn ModelStore<TaskRecord>> {
        self.inner.tasks.clone()
    }

    pub fn queue(&self) -> Arc<dyn DeliveryQueue> {
        self.inner.queue.clone()
    }

    /// TaskRecord を作って保存する（まだ配送はしない）
    pub async fn new_task(
        &self,
        kind: &str,
        target: TargetRef,
        user_cred: UserCred,
        params: Value,
        parent: Option<ParentLink>,
    ) -> Result<TaskRecord> {
        let task = self
            .inner
            .registry
            .get(kind)
            .ok_or_else(|| CumulusError::TaskNotRegistered(kind.to_string()))?;
        let params = into_params(params)?;
        let id: TaskId = self.inner.ids.generate();
        let record = TaskRecord::new(
            id,
            kind,
            target,
            user_cred,
            params,
            parent,
            task.init_stage(),
            self.now(),
        );
        let record = self.inner.tasks.insert(record).await?;
        tracing::info!(task_id = %record.id, kind, target = %record.target, "task created");
        Ok(record)
    }

    /// 現在の stage をキューに積む（呼び出し元では実行しない）
    pub async fn schedule_run(&self, task_id: TaskId, data: Value) -> Result<()> {
        let record = self.inner.tasks.get(task_id).await?;
        if record.is_terminal() {
            return Err(CumulusError::InvalidTransition(format!(
                "cannot schedule task {task_id}: already {}",
                record.state.as_str()
            )));
        }
        self.enqueue(StageEnvelope::stage(task_id, record.stage_seq, data))
            .await
    }

    /// new_task + schedule_run
    pub async fn start_task(
        &self,
        kind: &str,
        target: TargetRef,
        user_cred: UserCred,
        params: Value,
        parent: Option<ParentLink>,
    ) -> Result<TaskId> {
        let record = self
            .new_task(kind, target, user_cred, params, parent)
            .await?;
        self.schedule_run(record.id, Value::Null).await?;
        Ok(record.id)
    }

    pub(crate) async fn enqueue(&self, envelope: StageEnvelope) -> Result<()> {
        self.inner.queue.push(envelope).await?;
        Ok(())
    }

    /// envelope 1 件分の stage callback を実行する
    pub async fn execute(&self, envelope: StageEnvelope) -> Result<()> {
        let task_id = envelope.task_id;
        let lock = self.task_lock(task_id).await;
        let guard = lock.lock().await;

        let Some(mut record) = self.inner.tasks.fetch_by_id(task_id).await? else {
            tracing::warn!(%task_id, "drop envelope for unknown task");
            return Ok(());
        };
        if record.is_terminal() {
            tracing::debug!(
                %task_id,
                state = record.state.as_str(),
                "drop envelope for finished task"
            );
            return Ok(());
        }
        if envelope.stage_seq != record.stage_seq
            || record.dispatched_seq == Some(envelope.stage_seq)
        {
            tracing::debug!(
                %task_id,
                seq = envelope.stage_seq,
                current = record.stage_seq,
                "drop stale envelope"
            );
            return Ok(());
        }
        let task = self
            .inner
            .registry
            .get(&record.kind)
            .ok_or_else(|| CumulusError::TaskNotRegistered(record.kind.clone()))?;

        record.dispatched_seq = Some(envelope.stage_seq);
        tracing::debug!(
            %task_id,
            kind = %record.kind,
            stage = %record.stage,
            seq = envelope.stage_seq,
            failed = envelope.kind == DispatchKind::StageFailed,
            "dispatch stage"
        );

        let mut ctx = TaskContext::new(self.clone(), record);
        let outcome = task.dispatch(&mut ctx, envelope.kind, envelope.data).await;
        let (mut record, pending) = ctx.into_parts();

        if let Err(err) = outcome {
            tracing::warn!(
                %task_id,
                kind = %record.kind,
                stage = %record.stage,
                error = %err,
                "stage callback returned an error"
            );
            if !record.is_terminal() {
                record.fail(err.to_string(), self.now())?;
            }
        }

        let persisted = record.clone();
        self.inner
            .tasks
            .update_with_lock(task_id, Box::new(move |r: &mut TaskRecord| *r = persisted))
            .await?;
        drop(guard);

        for envelope in pending {
            self.enqueue(envelope).await?;
        }

        match record.state {
            TaskState::Running => {}
            TaskState::Complete => {
                tracing::info!(%task_id, kind = %record.kind, "task complete");
            }
            TaskState::Failed => {
                tracing::warn!(
                    %task_id,
                    kind = %record.kind,
                    stage = %record.stage,
                    reason = record.message.as_deref().unwrap_or_default(),
                    "task failed"
                );
            }
        }
        if record.is_terminal() {
            self.inner.task_locks.lock().await.remove(&task_id);
            self.resume_parent(&record).await?;
        }
        Ok(())
    }

    /// 終端に達した子タスクから、親の待っている stage 世代へ配送する
    async fn resume_parent(&self, child: &TaskRecord) -> Result<()> {
        let Some(parent) = child.parent else {
            return Ok(());
        };
        let envelope = match child.state {
            TaskState::Complete => StageEnvelope::stage(
                parent.task_id,
                parent.stage_seq,
                child.result.clone().unwrap_or(Value::Null),
            ),
            TaskState::Failed => StageEnvelope::failed(
                parent.task_id,
                parent.stage_seq,
                child.message.clone().unwrap_or_default(),
            ),
            TaskState::Running => return Ok(()),
        };
        tracing::debug!(child = %child.id, parent = %parent.task_id, "resume parent task");
        self.enqueue(envelope).await
    }

    async fn task_lock(&self, task_id: TaskId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.task_locks.lock().await;
        locks.entry(task_id).or_default().clone()
    }

    pub async fn fetch_task(&self, task_id: TaskId) -> Result<TaskRecord> {
        self.inner.tasks.get(task_id).await
    }

    /// 対象オブジェクトに対して作られたタスク（作成順）
    pub async fn tasks_for_target(&self, target: TargetRef) -> Result<Vec<TaskRecord>> {
        self.inner
            .tasks
            .query(&|r: &TaskRecord| r.target == target)
            .await
    }

    pub async fn counts(&self) -> Result<TaskCounts> {
        let all = self.inner.tasks.all().await?;
        Ok(TaskCounts::from_records(&all))
    }

    /// タスクが終端に達するまで待つ（ポーリング）
    pub async fn wait_terminal(&self, task_id: TaskId, timeout: Duration) -> Result<TaskRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.fetch_task(task_id).await?;
            if record.is_terminal() {
                return Ok(record);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CumulusError::internal(format!(
                    "task {task_id} still at stage {} after {}ms",
                    record.stage,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// ワーカーを使わず、キューが `idle` の間空になるまでこの場で実行する
    pub async fn run_until_idle(&self, idle: Duration) -> Result<usize> {
        let mut executed = 0;
        while let Some(envelope) = self.inner.queue.pop(idle).await? {
            self.execute(envelope).await?;
            executed += 1;
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GuestId, SkuId};
    use crate::testkit::fixtures::{
        EchoTask, FailingTask, ParentTask, TwoStageTask, engine_with_fixtures,
    };
    use crate::typed::Task;
    use serde_json::json;
    use ulid::Ulid;

    const IDLE: Duration = Duration::from_millis(20);

    fn guest_target() -> TargetRef {
        TargetRef::Guest(GuestId::from_ulid(Ulid::new()))
    }

    #[tokio::test]
    async fn schedule_run_does_not_execute_inline() {
        let engine = engine_with_fixtures();
        let id = engine
            .start_task(EchoTask::KIND, guest_target(), UserCred::system(), json!({}), None)
            .await
            .unwrap();

        let record = engine.fetch_task(id).await.unwrap();
        assert_eq!(record.state, TaskState::Running);
        assert_eq!(engine.queue().len().await, 1);

        engine.run_until_idle(IDLE).await.unwrap();
        let record = engine.fetch_task(id).await.unwrap();
        assert_eq!(record.state, TaskState::Complete);
        assert_eq!(record.result, Some(json!({"echo": true})));
    }

    #[tokio::test]
    async fn stages_run_in_order_and_complete() {
        let engine = engine_with_fixtures();
        let id = engine
            .start_task(
                TwoStageTask::KIND,
                guest_target(),
                UserCred::system(),
                json!({"n": 2}),
                None,
            )
            .await
            .unwrap();
        engine.run_until_idle(IDLE).await.unwrap();

        let record = engine.fetch_task(id).await.unwrap();
        assert_eq!(record.state, TaskState::Complete);
        assert_eq!(record.stages, vec!["init", "on_second"]);
        assert_eq!(record.result, Some(json!({"n": 3})));
    }

    #[tokio::test]
    async fn callback_error_fails_the_task() {
        let engine = engine_with_fixtures();
        let id = engine
            .start_task(FailingTask::KIND, guest_target(), UserCred::system(), json!({}), None)
            .await
            .unwrap();
        engine.run_until_idle(IDLE).await.unwrap();

        let record = engine.fetch_task(id).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert!(record.message.unwrap().contains("always fails"));
    }

    #[tokio::test]
    async fn duplicate_and_stale_envelopes_are_dropped() {
        let engine = engine_with_fixtures();
        let record = engine
            .new_task(TwoStageTask::KIND, guest_target(), UserCred::system(), json!({"n": 0}), None)
            .await
            .unwrap();

        // 同じ世代を 2 回配送しても init は 1 回だけ
        engine.schedule_run(record.id, Value::Null).await.unwrap();
        engine.schedule_run(record.id, Value::Null).await.unwrap();
        engine.run_until_idle(IDLE).await.unwrap();

        let done = engine.fetch_task(record.id).await.unwrap();
        assert_eq!(done.result, Some(json!({"n": 1})));

        // 終端後の古い envelope も無視される
        engine
            .execute(StageEnvelope::stage(record.id, 0, Value::Null))
            .await
            .unwrap();
        assert_eq!(engine.fetch_task(record.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let engine = engine_with_fixtures();
        let err = engine
            .new_task("NoSuchTask", guest_target(), UserCred::system(), json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CumulusError::TaskNotRegistered(kind) if kind == "NoSuchTask"));
    }

    #[tokio::test]
    async fn params_must_be_an_object() {
        let engine = engine_with_fixtures();
        let err = engine
            .new_task(EchoTask::KIND, guest_target(), UserCred::system(), json!([1, 2]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CumulusError::Internal(_)));
    }

    #[tokio::test]
    async fn completed_subtask_resumes_parent() {
        let engine = engine_with_fixtures();
        let parent = engine
            .start_task(
                ParentTask::KIND,
                TargetRef::ServerSku(SkuId::from_ulid(Ulid::new())),
                UserCred::system(),
                json!({"child": EchoTask::KIND}),
                None,
            )
            .await
            .unwrap();
        engine.run_until_idle(IDLE).await.unwrap();

        let record = engine.fetch_task(parent).await.unwrap();
        assert_eq!(record.state, TaskState::Complete);
        assert_eq!(record.stages, vec!["init", "on_child_complete"]);
        assert_eq!(record.result, Some(json!({"child_result": {"echo": true}})));
        assert_eq!(engine.counts().await.unwrap().complete, 2);
    }

    #[tokio::test]
    async fn failed_subtask_routes_to_parent_failure_handler() {
        let engine = engine_with_fixtures();
        let parent = engine
            .start_task(
                ParentTask::KIND,
                TargetRef::ServerSku(SkuId::from_ulid(Ulid::new())),
                UserCred::system(),
                json!({"child": FailingTask::KIND}),
                None,
            )
            .await
            .unwrap();
        engine.run_until_idle(IDLE).await.unwrap();

        let record = engine.fetch_task(parent).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(
            record.message.as_deref(),
            Some("child failed: internal error: always fails")
        );
        let counts = engine.counts().await.unwrap();
        assert_eq!((counts.failed, counts.total()), (2, 2));
    }

    #[tokio::test]
    async fn tasks_for_target_lists_started_tasks() {
        let engine = engine_with_fixtures();
        let target = guest_target();
        engine
            .start_task(EchoTask::KIND, target, UserCred::system(), json!({}), None)
            .await
            .unwrap();
        let tasks = engine.tasks_for_target(target).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, EchoTask::KIND);
    }
}
