//! ScriptedCommandClient - テスト・デモ用のチェーンアダプタ
//!
//! - initialize はデフォルトで受理し、deal と index から決まる id を返す
//! - finalize はデフォルトで受理する
//! - 状態読み取りは台本（`script_status`）を先頭から返し、最後の 1 件は繰り返す。
//!   台本が無ければ `Success`

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{
    ChainCommand, ChainDealId, ChainTaskId, CommandKind, CommandStatus, KeystoneError, Result,
};
use crate::ports::ChainCommandClient;

type ScriptedStatus = std::result::Result<CommandStatus, String>;

#[derive(Default)]
struct CommandState {
    initialize: HashMap<(ChainDealId, u32), Option<ChainTaskId>>,
    rejected_finalize: HashSet<ChainTaskId>,
    statuses: HashMap<(CommandKind, ChainTaskId), VecDeque<ScriptedStatus>>,
    fail_submissions: bool,
    status_reads: usize,
    submitted: Vec<ChainCommand>,
}

#[derive(Default)]
pub struct ScriptedCommandClient {
    state: Mutex<CommandState>,
}

impl ScriptedCommandClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain task id handed out for an unscripted initialize.
    pub fn derived_chain_task_id(chain_deal_id: &ChainDealId, task_index: u32) -> ChainTaskId {
        ChainTaskId::new(format!("{}-{:04}", chain_deal_id, task_index))
    }

    fn lock(&self) -> MutexGuard<'_, CommandState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn accept_initialize(&self, chain_deal_id: &ChainDealId, task_index: u32, id: ChainTaskId) {
        self.lock()
            .initialize
            .insert((chain_deal_id.clone(), task_index), Some(id));
    }

    pub fn reject_initialize(&self, chain_deal_id: &ChainDealId, task_index: u32) {
        self.lock()
            .initialize
            .insert((chain_deal_id.clone(), task_index), None);
    }

    pub fn reject_finalize(&self, chain_task_id: &ChainTaskId) {
        self.lock().rejected_finalize.insert(chain_task_id.clone());
    }

    /// Make submissions fail with a transport error.
    pub fn fail_submissions(&self, fail: bool) {
        self.lock().fail_submissions = fail;
    }

    pub fn script_status(
        &self,
        kind: CommandKind,
        chain_task_id: &str,
        statuses: Vec<Result<CommandStatus>>,
    ) {
        let script = statuses
            .into_iter()
            .map(|s| s.map_err(|e| e.to_string()))
            .collect();
        self.lock()
            .statuses
            .insert((kind, ChainTaskId::new(chain_task_id)), script);
    }

    pub fn status_reads(&self) -> usize {
        self.lock().status_reads
    }

    pub fn submitted(&self) -> Vec<ChainCommand> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl ChainCommandClient for ScriptedCommandClient {
    async fn request_initialize(
        &self,
        chain_deal_id: &ChainDealId,
        task_index: u32,
    ) -> Result<Option<ChainTaskId>> {
        let mut state = self.lock();
        if state.fail_submissions {
            return Err(KeystoneError::Command("chain adapter unreachable".to_string()));
        }
        state.submitted.push(ChainCommand::Initialize {
            chain_deal_id: chain_deal_id.clone(),
            task_index,
        });
        let answer = state
            .initialize
            .get(&(chain_deal_id.clone(), task_index))
            .cloned()
            .unwrap_or_else(|| Some(Self::derived_chain_task_id(chain_deal_id, task_index)));
        Ok(answer)
    }

    async fn request_finalize(
        &self,
        chain_task_id: &ChainTaskId,
        result_link: &str,
        callback: &str,
    ) -> Result<Option<ChainTaskId>> {
        let mut state = self.lock();
        if state.fail_submissions {
            return Err(KeystoneError::Command("chain adapter unreachable".to_string()));
        }
        state.submitted.push(ChainCommand::Finalize {
            chain_task_id: chain_task_id.clone(),
            result_link: result_link.to_string(),
            callback: callback.to_string(),
        });
        if state.rejected_finalize.contains(chain_task_id) {
            return Ok(None);
        }
        Ok(Some(chain_task_id.clone()))
    }

    async fn get_status(
        &self,
        kind: CommandKind,
        chain_task_id: &ChainTaskId,
    ) -> Result<CommandStatus> {
        let mut state = self.lock();
        state.status_reads += 1;
        let Some(script) = state.statuses.get_mut(&(kind, chain_task_id.clone())) else {
            return Ok(CommandStatus::Success);
        };
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(KeystoneError::Command(message)),
            None => Ok(CommandStatus::Success),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_scripted_status_repeats() {
        let client = ScriptedCommandClient::new();
        client.script_status(
            CommandKind::Finalize,
            "0xc1",
            vec![Ok(CommandStatus::Received), Ok(CommandStatus::Processing)],
        );
        let id = ChainTaskId::new("0xc1");

        let reads = [
            client.get_status(CommandKind::Finalize, &id).await.unwrap(),
            client.get_status(CommandKind::Finalize, &id).await.unwrap(),
            client.get_status(CommandKind::Finalize, &id).await.unwrap(),
        ];
        assert_eq!(
            reads,
            [
                CommandStatus::Received,
                CommandStatus::Processing,
                CommandStatus::Processing
            ]
        );
        // other kinds are unaffected
        assert_eq!(
            client.get_status(CommandKind::Initialize, &id).await.unwrap(),
            CommandStatus::Success
        );
    }

    #[tokio::test]
    async fn unscripted_initialize_derives_an_id() {
        let client = ScriptedCommandClient::new();
        let deal = ChainDealId::new("0xD1");
        let id = client.request_initialize(&deal, 7).await.unwrap();
        assert_eq!(id, Some(ChainTaskId::new("0xd1-0007")));
        assert_eq!(client.submitted().len(), 1);
    }
}
