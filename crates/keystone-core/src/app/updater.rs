//! TaskUpdater - 1 回の評価パス
//!
//! # フロー
//! 1. TaskStore から最新のタスクを読む
//! 2. SnapshotReader で外部状態を集める（エラーならパスを中断、変更なし）
//! 3. `decide` で遷移を決める（コマンド待ちなら `Pending` を返し、`poll_period` 後に再評価される）
//! 4. patch を当て、status path を積んで保存
//! 5. 副作用を実行し、成功/失敗に応じた path を積んで保存
//! 6. 積んだ status に対応するイベントを配送（失敗してもログのみ）
//!
//! 同じ id への呼び出しは UpdateScheduler が直列化する前提。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ChainCommand, Result, Task, TaskEvent, TaskId, TaskStatus};
use crate::engine::{
    decide, events_for, Decision, EnginePolicy, HoldReason, SideEffect, SnapshotReader, TaskPatch,
};
use crate::ports::{ChainQuery, EventSink, TaskStore};

use super::command_poller::CommandPoller;
use super::scheduler::{EvaluationOutcome, TaskEvaluator};

pub struct TaskUpdater {
    store: Arc<dyn TaskStore>,
    reader: SnapshotReader,
    poller: Arc<CommandPoller>,
    chain: Arc<dyn ChainQuery>,
    events: Arc<dyn EventSink>,
    policy: EnginePolicy,
}

impl TaskUpdater {
    pub fn new(
        store: Arc<dyn TaskStore>,
        reader: SnapshotReader,
        poller: Arc<CommandPoller>,
        chain: Arc<dyn ChainQuery>,
        events: Arc<dyn EventSink>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            store,
            reader,
            poller,
            chain,
            events,
            policy,
        }
    }

    /// 保存済みタスク `id` に対して 1 回の評価パスを走らせる
    pub async fn update(&self, id: TaskId) -> Result<EvaluationOutcome> {
        let Some(mut task) = self.store.find_by_id(id).await? else {
            debug!(task_id = %id, "task not found");
            return Ok(EvaluationOutcome::Missing);
        };
        if task.is_terminal() {
            return Ok(EvaluationOutcome::Unchanged { terminal: true });
        }

        let snap = self.reader.read(&task).await?;
        let transition = match decide(&task, &snap, &self.policy) {
            Decision::Hold(HoldReason::CommandPending) => {
                debug!(task_id = %id, status = %task.current_status(), "command still pending");
                return Ok(EvaluationOutcome::Pending {
                    retry_after: self.poller.poll_period(),
                });
            }
            Decision::Hold(reason) => {
                debug!(task_id = %id, status = %task.current_status(), %reason, "holding");
                return Ok(EvaluationOutcome::Unchanged {
                    terminal: task.is_terminal(),
                });
            }
            Decision::Advance(transition) => transition,
        };

        let from = task.current_status();
        apply_patch(&mut task, &transition.patch);
        let mut appended = transition.path.clone();
        append_path(&mut task, &transition.path, snap.now)?;
        if !transition.patch.is_empty() || !transition.path.is_empty() {
            task = self.store.save(task).await?;
        }

        if let Some(effect) = &transition.effect {
            let (saved, effect_path) = self.run_effect(task, effect).await?;
            task = saved;
            appended.extend_from_slice(effect_path);
        }

        if appended.is_empty() {
            return Ok(EvaluationOutcome::Unchanged {
                terminal: task.is_terminal(),
            });
        }

        info!(
            task_id = %id,
            %from,
            to = %task.current_status(),
            path = ?appended,
            "task advanced"
        );
        for event in events_for(&task, &appended, &snap) {
            self.publish(event).await;
        }

        Ok(EvaluationOutcome::Advanced {
            status: task.current_status(),
            terminal: task.is_terminal(),
        })
    }

    /// 保存したばかりの `task` に `effect` を実行する。保存後のタスクと、結果として積んだステータスを返す
    async fn run_effect(
        &self,
        mut task: Task,
        effect: &SideEffect,
    ) -> Result<(Task, &'static [TaskStatus])> {
        let succeeded = match effect {
            SideEffect::SubmitInitialize => {
                let command = ChainCommand::Initialize {
                    chain_deal_id: task.chain_deal_id.clone(),
                    task_index: task.task_index,
                };
                match self.poller.submit(&command).await {
                    Some(chain_task_id) => {
                        debug!(task_id = %task.id, %chain_task_id, "chain task id assigned");
                        task.chain_task_id = Some(chain_task_id);
                        true
                    }
                    None => false,
                }
            }
            SideEffect::Reopen => self.reopen(&task).await,
            SideEffect::SubmitFinalize { result_link } => match task.chain_task_id.clone() {
                Some(chain_task_id) => {
                    let command = ChainCommand::Finalize {
                        chain_task_id,
                        result_link: result_link.clone(),
                        callback: task.callback.clone().unwrap_or_default(),
                    };
                    self.poller.submit(&command).await.is_some()
                }
                None => false,
            },
            SideEffect::RequestUpload { worker } => {
                if let Some(chain_task_id) = task.chain_task_id.clone() {
                    info!(task_id = %task.id, %worker, "requesting result upload");
                    self.publish(TaskEvent::ResultUploadRequested {
                        task_id: task.id,
                        chain_task_id,
                        worker: worker.clone(),
                    })
                    .await;
                }
                return Ok((task, &[]));
            }
        };

        let path = if succeeded {
            effect.success_path()
        } else {
            warn!(task_id = %task.id, ?effect, "side effect failed");
            effect.failure_path()
        };
        let dirty = matches!(effect, SideEffect::SubmitInitialize) || !path.is_empty();
        append_path(&mut task, path, self.reader.now())?;
        if dirty {
            task = self.store.save(task).await?;
        }
        Ok((task, path))
    }

    async fn reopen(&self, task: &Task) -> bool {
        let Some(chain_task_id) = task.chain_task_id.as_ref() else {
            return false;
        };
        match self.chain.reopen(chain_task_id).await {
            Ok(Some(receipt)) => {
                info!(
                    task_id = %task.id,
                    block = receipt.block_number,
                    tx = %receipt.tx_hash,
                    "reopen mined"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "reopen call failed");
                false
            }
        }
    }

    async fn publish(&self, event: TaskEvent) {
        let task_id = event.task_id();
        if let Err(e) = self.events.emit(event).await {
            warn!(%task_id, error = %e, "event delivery failed");
        }
    }
}

#[async_trait]
impl TaskEvaluator for TaskUpdater {
    async fn evaluate(&self, id: TaskId) -> Result<EvaluationOutcome> {
        self.update(id).await
    }
}

fn apply_patch(task: &mut Task, patch: &TaskPatch) {
    if let Some(worker) = &patch.uploading_worker {
        task.uploading_worker = Some(worker.clone());
    }
    if let Some(link) = &patch.result_link {
        task.result_link = Some(link.clone());
    }
    if let Some(deadline) = patch.contribution_deadline {
        task.contribution_deadline = deadline;
    }
    if let Some(deadline) = patch.reveal_deadline {
        task.reveal_deadline = Some(deadline);
    }
}

fn append_path(task: &mut Task, path: &[TaskStatus], at: DateTime<Utc>) -> Result<()> {
    for status in path {
        task.change_status(*status, at)?;
    }
    Ok(())
}
