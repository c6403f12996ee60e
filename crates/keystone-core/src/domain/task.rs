//! Task record: identity, deadlines and the append-only status history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::KeystoneError;
use super::ids::{ChainDealId, ChainTaskId, TaskId, WalletAddress};
use super::status::TaskStatus;

/// One entry of the status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusChange {
    pub status: TaskStatus,
    pub date: DateTime<Utc>,
}

/// What is known about a task when its deal is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub chain_deal_id: ChainDealId,
    pub task_index: u32,
    pub app_name: String,
    pub command_line: String,
    pub workers_required: u32,
    pub max_execution_time_secs: u64,
    pub tag: String,
    pub contribution_deadline: DateTime<Utc>,
    pub final_deadline: DateTime<Utc>,
    #[serde(default)]
    pub callback: Option<String>,
}

/// A task tracked by the orchestrator.
///
/// Design:
/// - `current_status` and `status_history` are private: the only way to move a
///   task is `change_status`, which keeps the history and the current status
///   in sync.
/// - Once the task reaches a terminal status it rejects further changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub chain_task_id: Option<ChainTaskId>,
    pub chain_deal_id: ChainDealId,
    pub task_index: u32,

    current_status: TaskStatus,
    status_history: Vec<TaskStatusChange>,

    pub contribution_deadline: DateTime<Utc>,
    pub reveal_deadline: Option<DateTime<Utc>>,
    pub final_deadline: DateTime<Utc>,

    /// Number of workers required to reach a trusted result.
    pub workers_required: u32,

    pub uploading_worker: Option<WalletAddress>,
    pub result_link: Option<String>,
    pub callback: Option<String>,

    pub app_name: String,
    pub command_line: String,
    pub max_execution_time_secs: u64,
    pub tag: String,
}

impl Task {
    /// Create a task in `Received`.
    pub fn new(id: TaskId, spec: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            chain_task_id: None,
            chain_deal_id: spec.chain_deal_id,
            task_index: spec.task_index,
            current_status: TaskStatus::Received,
            status_history: vec![TaskStatusChange {
                status: TaskStatus::Received,
                date: now,
            }],
            contribution_deadline: spec.contribution_deadline,
            reveal_deadline: None,
            final_deadline: spec.final_deadline,
            workers_required: spec.workers_required,
            uploading_worker: None,
            result_link: None,
            callback: spec.callback,
            app_name: spec.app_name,
            command_line: spec.command_line,
            max_execution_time_secs: spec.max_execution_time_secs,
            tag: spec.tag,
        }
    }

    pub fn current_status(&self) -> TaskStatus {
        self.current_status
    }

    pub fn status_history(&self) -> &[TaskStatusChange] {
        &self.status_history
    }

    pub fn is_terminal(&self) -> bool {
        self.current_status.is_terminal()
    }

    /// Status right before the current one, if any.
    pub fn last_but_one_status(&self) -> Option<TaskStatus> {
        let len = self.status_history.len();
        if len < 2 {
            return None;
        }
        Some(self.status_history[len - 2].status)
    }

    /// Date of the most recent history entry with the given status.
    pub fn last_entered(&self, status: TaskStatus) -> Option<DateTime<Utc>> {
        self.status_history
            .iter()
            .rev()
            .find(|change| change.status == status)
            .map(|change| change.date)
    }

    pub fn is_past_final_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.final_deadline
    }

    /// Append `status` to the history and make it current.
    ///
    /// `at` earlier than the last entry is clamped so history dates never go
    /// backwards.
    pub fn change_status(
        &mut self,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<(), KeystoneError> {
        if self.current_status.is_terminal() {
            return Err(self.invalid(status, "task is terminal"));
        }
        if status.requires_chain_task_id() && self.chain_task_id.is_none() {
            return Err(self.invalid(status, "no chain task id yet"));
        }

        let date = match self.status_history.last() {
            Some(last) if last.date > at => last.date,
            _ => at,
        };
        self.status_history.push(TaskStatusChange { status, date });
        self.current_status = status;
        Ok(())
    }

    fn invalid(&self, to: TaskStatus, reason: &'static str) -> KeystoneError {
        KeystoneError::InvalidTransition {
            task_id: self.id,
            from: self.current_status,
            to,
            reason,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    pub const CHAIN_DEAL_ID: &str =
        "0xd82223e5feff6720792ffed1665e980da95e5d32b177332013eaba8edc07f31c";
    pub const CHAIN_TASK_ID: &str =
        "0x65bc5e94ed1486b940bd6cc0013c418efad58a0a52a3d08cee89faaa21970426";

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn new_task(now: DateTime<Utc>) -> NewTask {
        NewTask {
            chain_deal_id: ChainDealId::new(CHAIN_DEAL_ID),
            task_index: 0,
            app_name: "dappName".to_string(),
            command_line: "commandLine".to_string(),
            workers_required: 2,
            max_execution_time_secs: 60,
            tag: "0x0".to_string(),
            contribution_deadline: now + Duration::minutes(30),
            final_deadline: now + Duration::minutes(60),
            callback: None,
        }
    }

    /// A task with a chain id, already moved along `path`.
    pub fn task_at(path: &[TaskStatus], now: DateTime<Utc>) -> Task {
        let mut task = Task::new(TaskId::from_ulid(Ulid::new()), new_task(now), now);
        task.chain_task_id = Some(ChainTaskId::new(CHAIN_TASK_ID));
        for status in path {
            task.change_status(*status, now).unwrap();
        }
        task
    }
}
