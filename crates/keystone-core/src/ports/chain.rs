//! ChainQuery port - チェーン状態の読み取り
//!
//! Deadlines, status and winner counts on chain are authoritative: the engine
//! reads them here and never trusts its own copies for guards that involve
//! the chain.

use async_trait::async_trait;

use crate::domain::{ChainDealId, ChainReceipt, ChainTask, ChainTaskId, Result};

#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// `None` when the chain has no record for this id (yet).
    async fn get_chain_task(&self, chain_task_id: &ChainTaskId) -> Result<Option<ChainTask>>;

    async fn is_before_contribution_deadline(&self, chain_deal_id: &ChainDealId) -> Result<bool>;

    async fn is_task_unset_on_chain(&self, chain_deal_id: &ChainDealId, task_index: u32)
    -> Result<bool>;

    /// Whether the orchestrator's wallet can pay for one more transaction.
    async fn has_enough_gas(&self) -> Result<bool>;

    async fn can_reopen(&self, chain_task_id: &ChainTaskId) -> Result<bool>;

    async fn can_finalize(&self, chain_task_id: &ChainTaskId) -> Result<bool>;

    /// Send the reopen transaction. `None` means it was not mined.
    async fn reopen(&self, chain_task_id: &ChainTaskId) -> Result<Option<ChainReceipt>>;
}
