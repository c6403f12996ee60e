//! Chain commands: asynchronous requests sent to the chain adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ChainDealId, ChainTaskId};

/// Which kind of command is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Initialize,
    Finalize,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Initialize => f.write_str("initialize"),
            CommandKind::Finalize => f.write_str("finalize"),
        }
    }
}

/// Status reported by the chain adapter for a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Received,
    Processing,
    Success,
    Failure,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failure)
    }
}

/// Result of waiting for a command.
///
/// `Inconclusive` is never a failure: the caller tries again on a later
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Succeeded,
    Failed,
    Inconclusive,
}

/// A command to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCommand {
    Initialize {
        chain_deal_id: ChainDealId,
        task_index: u32,
    },
    Finalize {
        chain_task_id: ChainTaskId,
        result_link: String,
        callback: String,
    },
}

impl ChainCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            ChainCommand::Initialize { .. } => CommandKind::Initialize,
            ChainCommand::Finalize { .. } => CommandKind::Finalize,
        }
    }
}

/// A submitted command, identified by the chain task it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub kind: CommandKind,
    pub chain_task_id: ChainTaskId,
}

impl PendingCommand {
    pub fn new(kind: CommandKind, chain_task_id: ChainTaskId) -> Self {
        Self {
            kind,
            chain_task_id,
        }
    }
}
