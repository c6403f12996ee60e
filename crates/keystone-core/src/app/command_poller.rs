//! CommandPoller - 非同期チェーンコマンドの送信とポーリング
//!
//! # フロー
//! 1. `submit` でチェーンアダプタにコマンドを投げる（拒否なら `None`）
//! 2. `await_completion` で状態を読み、終端になるまで `poll_period` ごとに再読込
//! 3. `max_attempts` 回読んでも終端にならなければ `Inconclusive`
//!
//! 待機は `tokio::time::sleep` なので、止まるのは呼び出し元のタスクだけ。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PollerConfig;
use crate::domain::{ChainCommand, ChainTaskId, CommandOutcome, CommandStatus, PendingCommand};
use crate::ports::ChainCommandClient;

pub struct CommandPoller {
    client: Arc<dyn ChainCommandClient>,
    poll_period: Duration,
    max_attempts: u32,
}

impl CommandPoller {
    pub fn new(client: Arc<dyn ChainCommandClient>, config: &PollerConfig) -> Self {
        Self {
            client,
            poll_period: config.poll_period,
            max_attempts: config.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    /// `command` を送る。拒否も通信エラーも `None`
    pub async fn submit(&self, command: &ChainCommand) -> Option<ChainTaskId> {
        let result = match command {
            ChainCommand::Initialize {
                chain_deal_id,
                task_index,
            } => {
                self.client
                    .request_initialize(chain_deal_id, *task_index)
                    .await
            }
            ChainCommand::Finalize {
                chain_task_id,
                result_link,
                callback,
            } => {
                self.client
                    .request_finalize(chain_task_id, result_link, callback)
                    .await
            }
        };

        match result {
            Ok(Some(chain_task_id)) => {
                debug!(kind = %command.kind(), chain_task_id = %chain_task_id, "command accepted");
                Some(chain_task_id)
            }
            Ok(None) => {
                warn!(kind = %command.kind(), "command rejected");
                None
            }
            Err(e) => {
                warn!(kind = %command.kind(), error = %e, "command submission failed");
                None
            }
        }
    }

    /// 終端ステータスになるか試行回数が尽きるまでポーリングする
    pub async fn await_completion(&self, pending: &PendingCommand) -> CommandOutcome {
        for attempt in 1..=self.max_attempts {
            match self
                .client
                .get_status(pending.kind, &pending.chain_task_id)
                .await
            {
                Ok(CommandStatus::Success) => return CommandOutcome::Succeeded,
                Ok(CommandStatus::Failure) => return CommandOutcome::Failed,
                Ok(status) => {
                    debug!(
                        kind = %pending.kind,
                        chain_task_id = %pending.chain_task_id,
                        attempt,
                        ?status,
                        "command not finished yet"
                    );
                }
                Err(e) => {
                    warn!(
                        kind = %pending.kind,
                        chain_task_id = %pending.chain_task_id,
                        attempt,
                        error = %e,
                        "command status read failed"
                    );
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_period).await;
            }
        }

        debug!(
            kind = %pending.kind,
            chain_task_id = %pending.chain_task_id,
            "command still pending after max attempts"
        );
        CommandOutcome::Inconclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainDealId, CommandKind, KeystoneError};
    use crate::impls::ScriptedCommandClient;
    use tokio::time::Instant;

    const PERIOD: Duration = Duration::from_millis(10);

    fn poller(client: Arc<ScriptedCommandClient>, max_attempts: u32) -> CommandPoller {
        let config = PollerConfig {
            poll_period: PERIOD,
            max_attempts,
        };
        CommandPoller::new(client, &config)
    }

    fn pending() -> PendingCommand {
        PendingCommand::new(CommandKind::Initialize, ChainTaskId::new("0xc1"))
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_success_on_third_read() {
        let client = Arc::new(ScriptedCommandClient::new());
        client.script_status(
            CommandKind::Initialize,
            "0xc1",
            vec![
                Ok(CommandStatus::Received),
                Ok(CommandStatus::Processing),
                Ok(CommandStatus::Success),
            ],
        );
        let poller = poller(Arc::clone(&client), 3);

        let started = Instant::now();
        assert_eq!(poller.await_completion(&pending()).await, CommandOutcome::Succeeded);
        assert_eq!(client.status_reads(), 3);
        assert_eq!(started.elapsed(), PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_terminal() {
        let client = Arc::new(ScriptedCommandClient::new());
        client.script_status(
            CommandKind::Initialize,
            "0xc1",
            vec![Ok(CommandStatus::Processing), Ok(CommandStatus::Failure)],
        );
        let poller = poller(Arc::clone(&client), 5);

        assert_eq!(poller.await_completion(&pending()).await, CommandOutcome::Failed);
        assert_eq!(client.status_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_are_inconclusive_without_trailing_sleep() {
        let client = Arc::new(ScriptedCommandClient::new());
        client.script_status(
            CommandKind::Initialize,
            "0xc1",
            vec![
                Ok(CommandStatus::Received),
                Ok(CommandStatus::Received),
                Ok(CommandStatus::Received),
            ],
        );
        let poller = poller(Arc::clone(&client), 3);

        let started = Instant::now();
        assert_eq!(
            poller.await_completion(&pending()).await,
            CommandOutcome::Inconclusive
        );
        assert_eq!(client.status_reads(), 3);
        assert_eq!(started.elapsed(), PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_count_as_not_finished() {
        let client = Arc::new(ScriptedCommandClient::new());
        client.script_status(
            CommandKind::Initialize,
            "0xc1",
            vec![
                Err(KeystoneError::Command("adapter down".to_string())),
                Ok(CommandStatus::Success),
            ],
        );
        let poller = poller(Arc::clone(&client), 3);

        assert_eq!(poller.await_completion(&pending()).await, CommandOutcome::Succeeded);
    }

    #[tokio::test]
    async fn submit_maps_rejection_and_errors_to_none() {
        let client = Arc::new(ScriptedCommandClient::new());
        let poller = poller(Arc::clone(&client), 1);
        let deal = ChainDealId::new("0xd1");

        client.reject_initialize(&deal, 0);
        let command = ChainCommand::Initialize {
            chain_deal_id: deal.clone(),
            task_index: 0,
        };
        assert_eq!(poller.submit(&command).await, None);

        client.fail_submissions(true);
        let finalize = ChainCommand::Finalize {
            chain_task_id: ChainTaskId::new("0xc1"),
            result_link: "link".to_string(),
            callback: String::new(),
        };
        assert_eq!(poller.submit(&finalize).await, None);
    }

    #[tokio::test]
    async fn submit_returns_assigned_chain_task_id() {
        let client = Arc::new(ScriptedCommandClient::new());
        let deal = ChainDealId::new("0xd1");
        client.accept_initialize(&deal, 4, ChainTaskId::new("0xc4"));
        let poller = poller(Arc::clone(&client), 1);

        let command = ChainCommand::Initialize {
            chain_deal_id: deal,
            task_index: 4,
        };
        assert_eq!(poller.submit(&command).await, Some(ChainTaskId::new("0xc4")));
    }
}
