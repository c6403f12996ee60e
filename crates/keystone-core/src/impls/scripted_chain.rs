//! ScriptedChain - テスト・デモ用のチェーン
//!
//! 各問い合わせの答えをテスト側から設定できる。
//! デフォルトは「まだチェーンに無い、期限前、ガスあり、finalize 可、reopen 不可」。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{
    ChainDealId, ChainReceipt, ChainTask, ChainTaskId, ChainTaskStatus, KeystoneError, Result,
};
use crate::ports::ChainQuery;

struct ChainState {
    chain_tasks: HashMap<ChainTaskId, ChainTask>,
    unset_on_chain: bool,
    before_contribution_deadline: bool,
    enough_gas: bool,
    can_reopen: bool,
    can_finalize: bool,
    reopen_mined: bool,
    unavailable: bool,
    reopen_calls: usize,
    block_number: u64,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            chain_tasks: HashMap::new(),
            unset_on_chain: true,
            before_contribution_deadline: true,
            enough_gas: true,
            can_reopen: false,
            can_finalize: true,
            reopen_mined: true,
            unavailable: false,
            reopen_calls: 0,
            block_number: 0,
        }
    }
}

#[derive(Default)]
pub struct ScriptedChain {
    state: Mutex<ChainState>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<MutexGuard<'_, ChainState>> {
        let state = self.lock();
        if state.unavailable {
            return Err(KeystoneError::ChainQuery("chain node unreachable".to_string()));
        }
        Ok(state)
    }

    pub fn set_chain_task(&self, chain_task_id: &ChainTaskId, chain_task: ChainTask) {
        self.lock().chain_tasks.insert(chain_task_id.clone(), chain_task);
    }

    /// Change only the status of a known chain task.
    pub fn set_chain_status(&self, chain_task_id: &ChainTaskId, status: ChainTaskStatus) {
        if let Some(chain_task) = self.lock().chain_tasks.get_mut(chain_task_id) {
            chain_task.status = status;
        }
    }

    pub fn set_unset_on_chain(&self, unset: bool) {
        self.lock().unset_on_chain = unset;
    }

    pub fn set_before_contribution_deadline(&self, before: bool) {
        self.lock().before_contribution_deadline = before;
    }

    pub fn set_enough_gas(&self, enough: bool) {
        self.lock().enough_gas = enough;
    }

    pub fn set_can_reopen(&self, can: bool) {
        self.lock().can_reopen = can;
    }

    pub fn set_can_finalize(&self, can: bool) {
        self.lock().can_finalize = can;
    }

    pub fn set_reopen_mined(&self, mined: bool) {
        self.lock().reopen_mined = mined;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn reopen_calls(&self) -> usize {
        self.lock().reopen_calls
    }
}

#[async_trait]
impl ChainQuery for ScriptedChain {
    async fn get_chain_task(&self, chain_task_id: &ChainTaskId) -> Result<Option<ChainTask>> {
        Ok(self.check()?.chain_tasks.get(chain_task_id).cloned())
    }

    async fn is_before_contribution_deadline(&self, _chain_deal_id: &ChainDealId) -> Result<bool> {
        Ok(self.check()?.before_contribution_deadline)
    }

    async fn is_task_unset_on_chain(
        &self,
        _chain_deal_id: &ChainDealId,
        _task_index: u32,
    ) -> Result<bool> {
        Ok(self.check()?.unset_on_chain)
    }

    async fn has_enough_gas(&self) -> Result<bool> {
        Ok(self.check()?.enough_gas)
    }

    async fn can_reopen(&self, _chain_task_id: &ChainTaskId) -> Result<bool> {
        Ok(self.check()?.can_reopen)
    }

    async fn can_finalize(&self, _chain_task_id: &ChainTaskId) -> Result<bool> {
        Ok(self.check()?.can_finalize)
    }

    async fn reopen(&self, chain_task_id: &ChainTaskId) -> Result<Option<ChainReceipt>> {
        let mut state = self.check()?;
        state.reopen_calls += 1;
        if !state.reopen_mined {
            return Ok(None);
        }
        state.block_number += 1;
        let block_number = state.block_number;
        if let Some(chain_task) = state.chain_tasks.get_mut(chain_task_id) {
            chain_task.status = ChainTaskStatus::Active;
        }
        Ok(Some(ChainReceipt {
            block_number,
            tx_hash: format!("0x{:064x}", block_number),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn reopen_reactivates_the_chain_task() {
        let chain = ScriptedChain::new();
        let id = ChainTaskId::new("0xc1");
        let now = Utc::now();
        chain.set_chain_task(
            &id,
            ChainTask {
                status: ChainTaskStatus::Revealing,
                contribution_deadline: now,
                reveal_deadline: now,
                final_deadline: now,
                winner_count: 1,
                reveal_counter: 0,
            },
        );

        let receipt = chain.reopen(&id).await.unwrap();
        assert!(receipt.is_some());
        assert_eq!(
            chain.get_chain_task(&id).await.unwrap().unwrap().status,
            ChainTaskStatus::Active
        );
        assert_eq!(chain.reopen_calls(), 1);
    }

    #[tokio::test]
    async fn unavailable_chain_errors() {
        let chain = ScriptedChain::new();
        chain.set_unavailable(true);
        let err = chain.has_enough_gas().await.unwrap_err();
        assert!(matches!(err, KeystoneError::ChainQuery(_)));
    }
}
