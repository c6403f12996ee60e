//! Snapshot - 1 回の評価パスで参照する外部状態
//!
//! ガードはすべてパス開始時に取った 1 つのスナップショットに対して評価する。
//! `SnapshotReader` は現在のステータスに必要な分だけを問い合わせる。

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::app::command_poller::CommandPoller;
use crate::domain::{
    ChainTask, CommandKind, CommandOutcome, PendingCommand, Replicate, ReplicateStatus, Result,
    Task, TaskStatus,
};
use crate::ports::{ChainQuery, Clock, ReplicateQuery};

/// ガードが使う replicate の件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicateCounts {
    /// 現在 `Starting` か `Computed`
    pub starting_or_computed: u32,
    /// 現在 `Computed`
    pub computed: u32,
    /// 一度でも `Contributed` になった
    pub contributed: u32,
    /// 現在 `Revealed`
    pub revealed: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub now: DateTime<Utc>,
    pub chain_task: Option<ChainTask>,
    pub unset_on_chain: bool,
    pub before_contribution_deadline: bool,
    pub enough_gas: bool,
    pub can_reopen: bool,
    pub can_finalize: bool,
    /// 現在のステータスが待っているコマンドのポーリング結果
    pub command: Option<CommandOutcome>,
    pub counts: ReplicateCounts,
    /// revealed の replicate から一様に 1 つ選んだもの
    pub revealed_sample: Option<Replicate>,
    /// 現在アップロードを依頼しているワーカーの replicate
    pub uploader: Option<Replicate>,
    /// 結果をアップロード済みの replicate
    pub uploaded: Option<Replicate>,
}

impl Snapshot {
    /// まだ何も観測していないスナップショット
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            chain_task: None,
            unset_on_chain: false,
            before_contribution_deadline: false,
            enough_gas: false,
            can_reopen: false,
            can_finalize: false,
            command: None,
            counts: ReplicateCounts::default(),
            revealed_sample: None,
            uploader: None,
            uploaded: None,
        }
    }

    pub fn is_reveal_deadline_passed(&self, task: &Task) -> bool {
        task.reveal_deadline.is_some_and(|deadline| self.now > deadline)
    }
}

/// SnapshotReader は問い合わせ port からタスクの `Snapshot` を集める
///
/// 問い合わせが 1 つでも失敗したら読み取りを中断し、そのパスは変更なしで終わる。
pub struct SnapshotReader {
    chain: Arc<dyn ChainQuery>,
    replicates: Arc<dyn ReplicateQuery>,
    poller: Arc<CommandPoller>,
    clock: Arc<dyn Clock>,
}

impl SnapshotReader {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        replicates: Arc<dyn ReplicateQuery>,
        poller: Arc<CommandPoller>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain,
            replicates,
            poller,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn read(&self, task: &Task) -> Result<Snapshot> {
        let mut snap = Snapshot::at(self.clock.now());
        let status = task.current_status();

        // deadline checks win over everything, no need to ask anyone
        if status.is_terminal()
            || status == TaskStatus::FinalDeadlineReached
            || task.is_past_final_deadline(snap.now)
        {
            return Ok(snap);
        }

        if status == TaskStatus::Received {
            snap.unset_on_chain = self
                .chain
                .is_task_unset_on_chain(&task.chain_deal_id, task.task_index)
                .await?;
            snap.before_contribution_deadline = self
                .chain
                .is_before_contribution_deadline(&task.chain_deal_id)
                .await?;
            snap.enough_gas = self.chain.has_enough_gas().await?;
            return Ok(snap);
        }

        let Some(chain_task_id) = task.chain_task_id.as_ref() else {
            return Ok(snap);
        };

        match status {
            TaskStatus::Initializing => {
                let outcome = self
                    .poller
                    .await_completion(&PendingCommand::new(
                        CommandKind::Initialize,
                        chain_task_id.clone(),
                    ))
                    .await;
                if outcome == CommandOutcome::Succeeded {
                    snap.chain_task = self.chain.get_chain_task(chain_task_id).await?;
                }
                snap.command = Some(outcome);
            }
            TaskStatus::Initialized => {
                snap.chain_task = self.chain.get_chain_task(chain_task_id).await?;
                snap.counts.starting_or_computed = self
                    .replicates
                    .count_with_status(
                        chain_task_id,
                        &[ReplicateStatus::Starting, ReplicateStatus::Computed],
                    )
                    .await?;
                snap.counts.computed = self
                    .replicates
                    .count_with_status(chain_task_id, &[ReplicateStatus::Computed])
                    .await?;
            }
            TaskStatus::Running => {
                snap.chain_task = self.chain.get_chain_task(chain_task_id).await?;
                snap.counts.contributed = self
                    .replicates
                    .count_containing(chain_task_id, ReplicateStatus::Contributed)
                    .await?;
            }
            TaskStatus::ConsensusReached => {
                snap.counts.revealed = self
                    .replicates
                    .count_with_status(chain_task_id, &[ReplicateStatus::Revealed])
                    .await?;
                if snap.counts.revealed > 0 {
                    snap.revealed_sample = self
                        .replicates
                        .sample_with_reveal_status(chain_task_id)
                        .await?;
                } else if snap.is_reveal_deadline_passed(task) {
                    snap.can_reopen = self.chain.can_reopen(chain_task_id).await?;
                    snap.enough_gas = self.chain.has_enough_gas().await?;
                }
            }
            TaskStatus::AtLeastOneRevealed => {
                snap.revealed_sample = self
                    .replicates
                    .sample_with_reveal_status(chain_task_id)
                    .await?;
            }
            TaskStatus::ResultUploadRequested => {
                snap.uploader = self.read_uploader(task).await?;
                snap.revealed_sample = self
                    .replicates
                    .sample_with_reveal_status(chain_task_id)
                    .await?;
            }
            TaskStatus::ResultUploading => {
                snap.uploaded = self
                    .replicates
                    .get_with_result_uploaded_status(chain_task_id)
                    .await?;
                if snap.uploaded.is_none() {
                    snap.uploader = self.read_uploader(task).await?;
                    snap.revealed_sample = self
                        .replicates
                        .sample_with_reveal_status(chain_task_id)
                        .await?;
                }
            }
            TaskStatus::ResultUploaded => {
                snap.can_finalize = self.chain.can_finalize(chain_task_id).await?;
                snap.enough_gas = self.chain.has_enough_gas().await?;
            }
            TaskStatus::Finalizing => {
                let outcome = self
                    .poller
                    .await_completion(&PendingCommand::new(
                        CommandKind::Finalize,
                        chain_task_id.clone(),
                    ))
                    .await;
                snap.command = Some(outcome);
            }
            TaskStatus::Reopening => {
                snap.chain_task = self.chain.get_chain_task(chain_task_id).await?;
            }
            _ => {}
        }

        Ok(snap)
    }

    async fn read_uploader(&self, task: &Task) -> Result<Option<Replicate>> {
        match (task.chain_task_id.as_ref(), task.uploading_worker.as_ref()) {
            (Some(chain_task_id), Some(worker)) => {
                self.replicates.find_replicate(chain_task_id, worker).await
            }
            _ => Ok(None),
        }
    }
}
