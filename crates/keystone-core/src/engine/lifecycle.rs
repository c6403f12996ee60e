//! Lifecycle - ステータスごとの遷移判定
//!
//! `decide` はステータスで分岐して、ステータスごとの純粋関数に委譲する。
//!
//! # 優先順位
//! 1. 終端ステータスは何もしない
//! 2. final deadline（到達済みなら Failed、超過なら FinalDeadlineReached）
//! 3. contribution timeout（Initialized / Running のみ）
//! 4. 進捗のガード

use crate::domain::{ChainTaskStatus, CommandOutcome, ReplicateStatus, Task, TaskEvent, TaskStatus};

use super::decision::{Decision, EnginePolicy, HoldReason, SideEffect, TaskPatch, Transition};
use super::snapshot::Snapshot;

/// 1 回の評価パスで `task` をどう進めるかを決める
pub fn decide(task: &Task, snap: &Snapshot, policy: &EnginePolicy) -> Decision {
    let status = task.current_status();

    if status.is_terminal() {
        return Decision::Hold(HoldReason::Terminal);
    }
    if status == TaskStatus::FinalDeadlineReached {
        return advance(&[TaskStatus::Failed]);
    }
    if task.is_past_final_deadline(snap.now) {
        return advance(&[TaskStatus::FinalDeadlineReached]);
    }

    match status {
        TaskStatus::Received => received(snap),
        TaskStatus::Initializing => initializing(task, snap),
        TaskStatus::Initialized => initialized(task, snap),
        TaskStatus::Running => running(task, snap),
        TaskStatus::ConsensusReached => consensus_reached(task, snap),
        TaskStatus::AtLeastOneRevealed => request_upload(snap, &[TaskStatus::ResultUploadRequested]),
        TaskStatus::ResultUploadRequested => result_upload_requested(task, snap, policy),
        TaskStatus::ResultUploading => result_uploading(snap),
        TaskStatus::ResultUploaded => result_uploaded(task, snap),
        TaskStatus::Finalizing => finalizing(snap),
        TaskStatus::Finalized => advance(&[TaskStatus::Completed]),
        TaskStatus::Reopening => reopening(snap),
        TaskStatus::Reopened => advance(&[TaskStatus::Initialized]),
        TaskStatus::InitializeFailed
        | TaskStatus::ContributionTimeout
        | TaskStatus::ReopenFailed
        | TaskStatus::FinalizeFailed => advance(&[TaskStatus::Failed]),
        // handled above
        TaskStatus::FinalDeadlineReached | TaskStatus::Completed | TaskStatus::Failed => {
            Decision::Hold(HoldReason::Terminal)
        }
    }
}

fn advance(path: &[TaskStatus]) -> Decision {
    Decision::Advance(Transition::to(path))
}

fn received(snap: &Snapshot) -> Decision {
    if !snap.unset_on_chain || !snap.before_contribution_deadline {
        return Decision::Hold(HoldReason::ChainNotReady);
    }
    if !snap.enough_gas {
        return Decision::Hold(HoldReason::NotEnoughGas);
    }
    Decision::Advance(
        Transition::to(&[TaskStatus::Initializing]).with_effect(SideEffect::SubmitInitialize),
    )
}

fn initializing(task: &Task, snap: &Snapshot) -> Decision {
    // submission accepted but the chain id never got stored
    if task.chain_task_id.is_none() {
        return advance(&[TaskStatus::InitializeFailed, TaskStatus::Failed]);
    }
    match snap.command {
        Some(CommandOutcome::Succeeded) => {
            let patch = TaskPatch {
                contribution_deadline: snap.chain_task.as_ref().map(|c| c.contribution_deadline),
                ..TaskPatch::default()
            };
            Decision::Advance(Transition::to(&[TaskStatus::Initialized]).with_patch(patch))
        }
        Some(CommandOutcome::Failed) => {
            advance(&[TaskStatus::InitializeFailed, TaskStatus::Failed])
        }
        _ => Decision::Hold(HoldReason::CommandPending),
    }
}

fn contribution_timed_out(task: &Task, snap: &Snapshot) -> bool {
    snap.now > task.contribution_deadline
        && snap
            .chain_task
            .as_ref()
            .is_some_and(|c| c.status == ChainTaskStatus::Active)
}

fn initialized(task: &Task, snap: &Snapshot) -> Decision {
    if contribution_timed_out(task, snap) {
        return advance(&[TaskStatus::ContributionTimeout, TaskStatus::Failed]);
    }
    let required = task.workers_required;
    if snap.counts.starting_or_computed >= required && snap.counts.computed < required {
        return advance(&[TaskStatus::Running]);
    }
    Decision::Hold(HoldReason::WaitingForWorkers)
}

fn running(task: &Task, snap: &Snapshot) -> Decision {
    if contribution_timed_out(task, snap) {
        return advance(&[TaskStatus::ContributionTimeout, TaskStatus::Failed]);
    }
    let Some(chain_task) = snap.chain_task.as_ref() else {
        return Decision::Hold(HoldReason::ChainNotReady);
    };
    if chain_task.status != ChainTaskStatus::Revealing {
        return Decision::Hold(HoldReason::ChainNotReady);
    }
    if snap.counts.contributed != chain_task.winner_count {
        return Decision::Hold(HoldReason::WaitingForWorkers);
    }
    let patch = TaskPatch {
        reveal_deadline: Some(chain_task.reveal_deadline),
        ..TaskPatch::default()
    };
    Decision::Advance(Transition::to(&[TaskStatus::ConsensusReached]).with_patch(patch))
}

fn consensus_reached(task: &Task, snap: &Snapshot) -> Decision {
    if snap.counts.revealed >= 1 {
        return request_upload(
            snap,
            &[
                TaskStatus::AtLeastOneRevealed,
                TaskStatus::ResultUploadRequested,
            ],
        );
    }
    if !snap.is_reveal_deadline_passed(task) || !snap.can_reopen {
        return Decision::Hold(HoldReason::ChainNotReady);
    }
    if !snap.enough_gas {
        return Decision::Hold(HoldReason::NotEnoughGas);
    }
    Decision::Advance(Transition::to(&[TaskStatus::Reopening]).with_effect(SideEffect::Reopen))
}

/// 抽選した revealed ワーカーをアップロード担当にして `path` を進む
fn request_upload(snap: &Snapshot, path: &[TaskStatus]) -> Decision {
    let Some(sample) = snap.revealed_sample.as_ref() else {
        return Decision::Hold(HoldReason::WaitingForWorkers);
    };
    let worker = sample.wallet_address.clone();
    let patch = TaskPatch {
        uploading_worker: Some(worker.clone()),
        ..TaskPatch::default()
    };
    Decision::Advance(
        Transition::to(path)
            .with_patch(patch)
            .with_effect(SideEffect::RequestUpload { worker }),
    )
}

fn uploader_status(snap: &Snapshot) -> Option<ReplicateStatus> {
    snap.uploader.as_ref().map(|r| r.current_status())
}

fn result_upload_requested(task: &Task, snap: &Snapshot, policy: &EnginePolicy) -> Decision {
    match uploader_status(snap) {
        Some(ReplicateStatus::ResultUploading | ReplicateStatus::ResultUploaded) => {
            return advance(&[TaskStatus::ResultUploading]);
        }
        Some(status) if status.is_upload_failure() => {
            return request_upload(snap, &[TaskStatus::ResultUploadRequested]);
        }
        _ => {}
    }

    let window_elapsed = task
        .last_entered(TaskStatus::ResultUploadRequested)
        .and_then(|entered| (snap.now - entered).to_std().ok())
        .is_some_and(|waited| waited > policy.upload_request_window);
    if window_elapsed {
        return request_upload(snap, &[TaskStatus::ResultUploadRequested]);
    }
    Decision::Hold(HoldReason::WaitingForUpload)
}

fn result_uploading(snap: &Snapshot) -> Decision {
    if let Some(link) = snap.uploaded.as_ref().and_then(|r| r.result_link.clone()) {
        let patch = TaskPatch {
            result_link: Some(link),
            ..TaskPatch::default()
        };
        return Decision::Advance(Transition::to(&[TaskStatus::ResultUploaded]).with_patch(patch));
    }
    if uploader_status(snap).is_some_and(ReplicateStatus::is_upload_failure) {
        return request_upload(snap, &[TaskStatus::ResultUploadRequested]);
    }
    Decision::Hold(HoldReason::WaitingForUpload)
}

fn result_uploaded(task: &Task, snap: &Snapshot) -> Decision {
    if !snap.can_finalize {
        return Decision::Hold(HoldReason::ChainNotReady);
    }
    if !snap.enough_gas {
        return Decision::Hold(HoldReason::NotEnoughGas);
    }
    let Some(result_link) = task.result_link.clone() else {
        return Decision::Hold(HoldReason::MissingResultLink);
    };
    Decision::Advance(Transition::to(&[]).with_effect(SideEffect::SubmitFinalize { result_link }))
}

fn finalizing(snap: &Snapshot) -> Decision {
    match snap.command {
        Some(CommandOutcome::Succeeded) => {
            advance(&[TaskStatus::Finalized, TaskStatus::Completed])
        }
        Some(CommandOutcome::Failed) => {
            advance(&[TaskStatus::FinalizeFailed, TaskStatus::Failed])
        }
        _ => Decision::Hold(HoldReason::CommandPending),
    }
}

fn reopening(snap: &Snapshot) -> Decision {
    match snap.chain_task.as_ref() {
        Some(chain_task) if chain_task.status == ChainTaskStatus::Active => {
            advance(&[TaskStatus::Reopened, TaskStatus::Initialized])
        }
        _ => Decision::Hold(HoldReason::ChainNotReady),
    }
}

/// `appended` を保存したあとに配送するイベント
///
/// `task` は保存済みのレコードなので、履歴の末尾はすでに `appended`。
pub fn events_for(task: &Task, appended: &[TaskStatus], snap: &Snapshot) -> Vec<TaskEvent> {
    let task_id = task.id;
    let chain_task_id = task.chain_task_id.clone();
    let mut events = Vec::new();

    for (i, status) in appended.iter().enumerate() {
        let event = match (status, chain_task_id.clone()) {
            (TaskStatus::ConsensusReached, Some(chain_task_id)) => TaskEvent::ConsensusReached {
                task_id,
                chain_task_id,
                winner_count: snap.chain_task.as_ref().map_or(0, |c| c.winner_count),
            },
            (TaskStatus::ContributionTimeout, Some(chain_task_id)) => {
                TaskEvent::ContributionTimeout {
                    task_id,
                    chain_task_id,
                }
            }
            (TaskStatus::Reopened, Some(chain_task_id)) => TaskEvent::Reopened {
                task_id,
                chain_task_id,
            },
            (TaskStatus::Completed, Some(chain_task_id)) => TaskEvent::Completed {
                task_id,
                chain_task_id,
                result_link: task.result_link.clone(),
            },
            (TaskStatus::Failed, _) => {
                let cause = if i > 0 {
                    Some(appended[i - 1])
                } else {
                    task.last_but_one_status()
                };
                TaskEvent::Failed { task_id, cause }
            }
            _ => continue,
        };
        events.push(event);
    }
    events
}
