//! Task lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
///
/// The statuses form a directed graph rather than a chain:
/// - Received -> Initializing -> Initialized -> Running -> ConsensusReached
/// - ConsensusReached -> AtLeastOneRevealed -> ResultUploadRequested
///   -> ResultUploading -> ResultUploaded -> Finalizing -> Finalized -> Completed
/// - ConsensusReached -> Reopening -> Reopened -> Initialized
/// - ResultUploadRequested <-> ResultUploading (re-request)
/// - every `*Failed` / `ContributionTimeout` / `FinalDeadlineReached` -> Failed
///
/// `Completed` and `Failed` are the only terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Received,
    Initializing,
    Initialized,
    InitializeFailed,
    Running,
    ContributionTimeout,
    ConsensusReached,
    Reopening,
    Reopened,
    ReopenFailed,
    AtLeastOneRevealed,
    ResultUploadRequested,
    ResultUploading,
    ResultUploaded,
    Finalizing,
    Finalized,
    FinalizeFailed,
    FinalDeadlineReached,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 20] = [
        TaskStatus::Received,
        TaskStatus::Initializing,
        TaskStatus::Initialized,
        TaskStatus::InitializeFailed,
        TaskStatus::Running,
        TaskStatus::ContributionTimeout,
        TaskStatus::ConsensusReached,
        TaskStatus::Reopening,
        TaskStatus::Reopened,
        TaskStatus::ReopenFailed,
        TaskStatus::AtLeastOneRevealed,
        TaskStatus::ResultUploadRequested,
        TaskStatus::ResultUploading,
        TaskStatus::ResultUploaded,
        TaskStatus::Finalizing,
        TaskStatus::Finalized,
        TaskStatus::FinalizeFailed,
        TaskStatus::FinalDeadlineReached,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Terminal statuses.
    pub fn final_statuses() -> &'static [TaskStatus] {
        &[TaskStatus::Completed, TaskStatus::Failed]
    }

    /// Statuses from which the final deadline can no longer be reached.
    pub fn statuses_where_final_deadline_is_impossible() -> &'static [TaskStatus] {
        &[
            TaskStatus::FinalDeadlineReached,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ]
    }

    /// Statuses a task may only enter once the chain has assigned its id.
    ///
    /// Failure-side statuses are reachable without a chain id: an initialize
    /// request can be rejected before any id exists.
    pub fn requires_chain_task_id(self) -> bool {
        !matches!(
            self,
            TaskStatus::Received
                | TaskStatus::Initializing
                | TaskStatus::InitializeFailed
                | TaskStatus::FinalDeadlineReached
                | TaskStatus::Failed
        )
    }

    /// Intermediate statuses that record why a task is about to fail.
    pub fn is_failure_cause(self) -> bool {
        matches!(
            self,
            TaskStatus::InitializeFailed
                | TaskStatus::ContributionTimeout
                | TaskStatus::ReopenFailed
                | TaskStatus::FinalizeFailed
                | TaskStatus::FinalDeadlineReached
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Received => "RECEIVED",
            TaskStatus::Initializing => "INITIALIZING",
            TaskStatus::Initialized => "INITIALIZED",
            TaskStatus::InitializeFailed => "INITIALIZE_FAILED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::ContributionTimeout => "CONTRIBUTION_TIMEOUT",
            TaskStatus::ConsensusReached => "CONSENSUS_REACHED",
            TaskStatus::Reopening => "REOPENING",
            TaskStatus::Reopened => "REOPENED",
            TaskStatus::ReopenFailed => "REOPEN_FAILED",
            TaskStatus::AtLeastOneRevealed => "AT_LEAST_ONE_REVEALED",
            TaskStatus::ResultUploadRequested => "RESULT_UPLOAD_REQUESTED",
            TaskStatus::ResultUploading => "RESULT_UPLOADING",
            TaskStatus::ResultUploaded => "RESULT_UPLOADED",
            TaskStatus::Finalizing => "FINALIZING",
            TaskStatus::Finalized => "FINALIZED",
            TaskStatus::FinalizeFailed => "FINALIZE_FAILED",
            TaskStatus::FinalDeadlineReached => "FINAL_DEADLINE_REACHED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_two_terminal_statuses() {
        let terminal: Vec<_> = TaskStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![TaskStatus::Completed, TaskStatus::Failed]);
        assert_eq!(TaskStatus::final_statuses(), terminal.as_slice());
    }

    #[test]
    fn serde_name_matches_display() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn failure_side_statuses_do_not_need_a_chain_id() {
        assert!(!TaskStatus::InitializeFailed.requires_chain_task_id());
        assert!(!TaskStatus::FinalDeadlineReached.requires_chain_task_id());
        assert!(!TaskStatus::Failed.requires_chain_task_id());
        assert!(TaskStatus::Initialized.requires_chain_task_id());
        assert!(TaskStatus::Completed.requires_chain_task_id());
    }
}
