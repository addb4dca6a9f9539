//! Errors - エラー型と分類
//!
//! - `CumulusError`: crate 全体のエラー
//! - `ValidationError`: 状態を変更する前に拒否する入力エラー
//! - `ErrorKind`: 運用上の分類（NotFound は dissociate では benign、それ以外では hard error）

use thiserror::Error;

/// ErrorKind は実行エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    RemoteProvider,
    LockContention,
    Internal,
}

/// 入力検証エラー（タスクは開始されない）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("invalid input parameter: {0}")]
    InputParameter(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not empty: {0}")]
    NotEmpty(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

#[derive(Debug, Error)]
pub enum CumulusError {
    #[error("{keyword} {id} not found")]
    NotFound { keyword: &'static str, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("remote provider error: {0}")]
    RemoteProvider(String),

    #[error("lock contention: {0}")]
    LockContention(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("task kind '{0}' is not registered")]
    TaskNotRegistered(String),

    #[error("task kind '{kind}' has no stage named '{stage}'")]
    UnknownStage { kind: String, stage: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("task target mismatch: expected {expected}, got {actual}")]
    TargetMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Queue(#[from] crate::ports::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CumulusError>;

impl CumulusError {
    pub fn not_found(keyword: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            keyword,
            id: id.to_string(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteProvider(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::RemoteProvider(_) => ErrorKind::RemoteProvider,
            Self::LockContention(_) => ErrorKind::LockContention,
            Self::Internal(_)
            | Self::TaskNotRegistered(_)
            | Self::UnknownStage { .. }
            | Self::InvalidTransition(_)
            | Self::TargetMismatch { .. }
            | Self::Queue(_)
            | Self::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
