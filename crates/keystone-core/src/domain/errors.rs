//! Errors - エラー型と分類

use thiserror::Error;

use super::ids::{ChainTaskId, TaskId};
use super::status::TaskStatus;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（次のトリガーで再評価すればよい）
/// - Permanent: 恒久的なエラー（再評価しても結果は変わらない）
/// - Infrastructure: 外部システム（ストア、チェーン）の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum KeystoneError {
    #[error("task store: {0}")]
    Store(String),

    #[error("chain query: {0}")]
    ChainQuery(String),

    #[error("replicate query: {0}")]
    Replicates(String),

    #[error("chain command: {0}")]
    Command(String),

    #[error("task {task_id} cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        reason: &'static str,
    },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("no task for chain task {0}")]
    ChainTaskNotFound(ChainTaskId),

    #[error("{0}")]
    Config(String),
}

impl KeystoneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeystoneError::Store(_) => ErrorKind::Infrastructure,
            KeystoneError::ChainQuery(_)
            | KeystoneError::Replicates(_)
            | KeystoneError::Command(_) => ErrorKind::Transient,
            KeystoneError::InvalidTransition { .. }
            | KeystoneError::TaskNotFound(_)
            | KeystoneError::ChainTaskNotFound(_)
            | KeystoneError::Config(_) => ErrorKind::Permanent,
        }
    }
}

pub type Result<T, E = KeystoneError> = std::result::Result<T, E>;
