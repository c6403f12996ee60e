//! On-chain view of a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainTaskStatus {
    Unset,
    Active,
    Revealing,
    Completed,
    Failed,
}

/// The chain-side record mirroring a task. Source of truth for deadlines,
/// status and winner count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTask {
    pub status: ChainTaskStatus,
    pub contribution_deadline: DateTime<Utc>,
    pub reveal_deadline: DateTime<Utc>,
    pub final_deadline: DateTime<Utc>,
    pub winner_count: u32,
    pub reveal_counter: u32,
}

/// Receipt of a transaction sent directly by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    pub block_number: u64,
    pub tx_hash: String,
}
