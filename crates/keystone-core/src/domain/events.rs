//! Events - ドメインイベント
//!
//! 状態遷移のうち、外部（ワーカー、通知、監査）に知らせるべきものを表す。
//! ワーカーへの「結果をアップロードしてほしい」という依頼も
//! `ResultUploadRequested` として EventSink 経由で配送される。

use serde::{Deserialize, Serialize};

use super::ids::{ChainTaskId, TaskId, WalletAddress};
use super::status::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    ConsensusReached {
        task_id: TaskId,
        chain_task_id: ChainTaskId,
        winner_count: u32,
    },
    ContributionTimeout {
        task_id: TaskId,
        chain_task_id: ChainTaskId,
    },
    ResultUploadRequested {
        task_id: TaskId,
        chain_task_id: ChainTaskId,
        worker: WalletAddress,
    },
    Reopened {
        task_id: TaskId,
        chain_task_id: ChainTaskId,
    },
    Completed {
        task_id: TaskId,
        chain_task_id: ChainTaskId,
        result_link: Option<String>,
    },
    Failed {
        task_id: TaskId,
        /// The `*Failed` / timeout status recorded right before `Failed`.
        cause: Option<TaskStatus>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::ConsensusReached { task_id, .. }
            | TaskEvent::ContributionTimeout { task_id, .. }
            | TaskEvent::ResultUploadRequested { task_id, .. }
            | TaskEvent::Reopened { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }
}
