//! Replicate model: one worker's execution attempt against a task.

use serde::{Deserialize, Serialize};

use super::ids::{ChainTaskId, WalletAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicateStatus {
    Created,
    Starting,
    Computed,
    Contributed,
    Revealed,
    ResultUploadRequested,
    ResultUploading,
    ResultUploaded,
    ResultUploadRequestFailed,
    ResultUploadFailed,
    Completed,
    Failed,
}

impl ReplicateStatus {
    /// The worker gave up on an upload it was asked to do.
    pub fn is_upload_failure(self) -> bool {
        matches!(
            self,
            ReplicateStatus::ResultUploadRequestFailed | ReplicateStatus::ResultUploadFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replicate {
    pub wallet_address: WalletAddress,
    pub chain_task_id: ChainTaskId,
    status_history: Vec<ReplicateStatus>,
    pub result_link: Option<String>,
}

impl Replicate {
    pub fn new(wallet_address: WalletAddress, chain_task_id: ChainTaskId) -> Self {
        Self {
            wallet_address,
            chain_task_id,
            status_history: vec![ReplicateStatus::Created],
            result_link: None,
        }
    }

    pub fn current_status(&self) -> ReplicateStatus {
        // history is created non-empty and only grows
        self.status_history
            .last()
            .copied()
            .unwrap_or(ReplicateStatus::Created)
    }

    pub fn status_history(&self) -> &[ReplicateStatus] {
        &self.status_history
    }

    pub fn contains_status(&self, status: ReplicateStatus) -> bool {
        self.status_history.contains(&status)
    }

    pub fn update_status(&mut self, status: ReplicateStatus) {
        self.status_history.push(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_status_looks_at_whole_history() {
        let mut replicate = Replicate::new(WalletAddress::new("0x1"), ChainTaskId::new("0xc"));
        replicate.update_status(ReplicateStatus::Contributed);
        replicate.update_status(ReplicateStatus::Revealed);

        assert_eq!(replicate.current_status(), ReplicateStatus::Revealed);
        assert!(replicate.contains_status(ReplicateStatus::Contributed));
        assert!(!replicate.contains_status(ReplicateStatus::ResultUploaded));
    }
}
