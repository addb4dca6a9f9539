//! TaskRecord - 実行中の多段タスク
//!
//! # 不変条件
//! - 状態は {running-at-stage-X, complete, failed} のいずれか一つ
//! - stage 遷移は一方向（一度入った stage には戻れない）
//! - `stage_seq` は `enter_stage` のたびに +1 され、callback の世代を表す

use super::errors::{CumulusError, Result};
use super::ids::{EipId, GuestId, SkuId, Task, TaskId};
use super::model::Model;
use super::state::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// タスクの対象オブジェクト
///
/// タスク実装は callback の冒頭で `guest_id()` などで取り出し、
/// 種類が違えば `TargetMismatch` で即座に失敗します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TargetRef {
    Guest(GuestId),
    Elasticip(EipId),
    ServerSku(SkuId),
}

impl TargetRef {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Guest(_) => "guest",
            Self::Elasticip(_) => "eip",
            Self::ServerSku(_) => "serversku",
        }
    }

    pub fn guest_id(&self) -> Result<GuestId> {
        match self {
            Self::Guest(id) => Ok(*id),
            other => Err(other.mismatch("guest")),
        }
    }

    pub fn eip_id(&self) -> Result<EipId> {
        match self {
            Self::Elasticip(id) => Ok(*id),
            other => Err(other.mismatch("eip")),
        }
    }

    pub fn sku_id(&self) -> Result<SkuId> {
        match self {
            Self::ServerSku(id) => Ok(*id),
            other => Err(other.mismatch("serversku")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> CumulusError {
        CumulusError::TargetMismatch {
            expected,
            actual: self.keyword(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest(id) => write!(f, "{id}"),
            Self::Elasticip(id) => write!(f, "{id}"),
            Self::ServerSku(id) => write!(f, "{id}"),
        }
    }
}

/// 操作を起こしたユーザーの資格情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCred {
    pub user: String,
    pub project: String,
}

impl UserCred {
    pub fn new(user: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            project: project.into(),
        }
    }

    /// 内部処理（同期・自動削除）用
    pub fn system() -> Self {
        Self::new("sysadmin", "system")
    }
}

/// 親タスクへの継続参照
///
/// 子タスクが終端に達したら、エンジンが親の `stage_seq` 世代に dispatch します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub task_id: TaskId,
    pub stage_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: String,
    pub target: TargetRef,
    pub user_cred: UserCred,
    pub params: Map<String, Value>,
    pub parent: Option<ParentLink>,

    /// 次に呼ぶ（または実行中の）stage 名
    pub stage: String,
    pub stage_seq: u64,
    /// callback を実行済みの最後の世代
    pub dispatched_seq: Option<u64>,
    /// これまでに入った stage（順番通り）
    pub stages: Vec<String>,

    pub state: TaskState,
    pub message: Option<String>,
    pub result: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        kind: impl Into<String>,
        target: TargetRef,
        user_cred: UserCred,
        params: Map<String, Value>,
        parent: Option<ParentLink>,
        init_stage: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            target,
            user_cred,
            params,
            parent,
            stage: init_stage.to_string(),
            stage_seq: 0,
            dispatched_seq: None,
            stages: vec![init_stage.to_string()],
            state: TaskState::Running,
            message: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 次の stage に進む。終端済み、または既に通過した stage なら `InvalidTransition`
    pub fn enter_stage(&mut self, stage: &str, now: DateTime<Utc>) -> Result<u64> {
        self.ensure_running("set stage")?;
        if self.stages.iter().any(|s| s == stage) {
            return Err(CumulusError::InvalidTransition(format!(
                "task {} ({}) already passed stage {stage}",
                self.id, self.kind
            )));
        }
        self.stage = stage.to_string();
        self.stages.push(stage.to_string());
        self.stage_seq += 1;
        self.updated_at = now;
        Ok(self.stage_seq)
    }

    pub fn complete(&mut self, result: Option<Value>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running("complete")?;
        self.state = TaskState::Complete;
        self.result = result;
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running("fail")?;
        self.state = TaskState::Failed;
        self.message = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 他のタスクから起動された場合、対象の status 更新は親に任せる
    pub fn is_subtask(&self) -> bool {
        self.param_bool("subtask")
    }

    pub fn param_bool(&self, key: &str) -> bool {
        match self.params.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
            _ => false,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    fn ensure_running(&self, action: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CumulusError::InvalidTransition(format!(
                "cannot {action}: task {} is already {}",
                self.id,
                self.state.as_str()
            )));
        }
        Ok(())
    }
}

impl Model for TaskRecord {
    type Marker = Task;

    const KEYWORD: &'static str = "task";

    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.kind
    }
}
