//! UpdateScheduler - タスクごとに直列化された再評価
//!
//! # 保証
//! - 同じ TaskId の評価は同時に 2 つ走らない（id ごとに生きているワーカーは常に 1 つ）
//! - キューは「実行中 1 + 待ち 1」。それ以上の要求は捨てる（Coalesced）
//! - 別の id 同士は並列に走る
//!
//! # スロットの寿命
//! - 要求のたびに TTL を延長する
//! - 実行中・待ちありのスロットは sweep で回収せず、TTL を延長する
//! - 終端に達したタスクのスロットはすぐに回収する
//! - キャンセルは評価と評価の間でしか効かない（評価の途中では止めない）
//! - 回収したスロットのワーカーが終了するまで、その id は retiring 扱い。
//!   その間の要求は 1 件にまとめて保留し、ワーカー終了時に新しいスロットで流す
//!
//! # チェーンコマンド待ち
//! - 評価が `Pending` を返したら `retry_after` 後に自分で再要求する

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{Result, TaskId, TaskStatus};

use super::registry::ExpiringRegistry;

/// 1 回の評価の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Advanced { status: TaskStatus, terminal: bool },
    Unchanged { terminal: bool },
    /// 送ったチェーンコマンドの結果がまだ出ていない。`retry_after` 後にもう一度評価する
    Pending { retry_after: Duration },
    /// ストアにこの id のタスクがない
    Missing,
}

impl EvaluationOutcome {
    fn is_final(self) -> bool {
        matches!(
            self,
            EvaluationOutcome::Advanced { terminal: true, .. }
                | EvaluationOutcome::Unchanged { terminal: true }
                | EvaluationOutcome::Missing
        )
    }
}

/// TaskEvaluator は保存済みタスクに対する 1 回の評価パス
#[async_trait]
pub trait TaskEvaluator: Send + Sync {
    async fn evaluate(&self, id: TaskId) -> Result<EvaluationOutcome>;
}

/// `request_update` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// この id の評価を 1 件積んだ
    Scheduled,
    /// すでに 1 件待っているので何も足さない
    Coalesced,
    /// スケジューラは停止済み
    Stopped,
}

#[derive(Clone)]
struct Slot {
    sender: mpsc::Sender<()>,
    /// 待ち + 実行中の評価数。増やすのは slots のロック中だけ
    in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Slot {
    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

struct Slots {
    live: ExpiringRegistry<TaskId, Slot>,
    /// 外したがワーカーがまだ終わっていないスロット。その間に要求が来たら true
    retiring: HashMap<TaskId, bool>,
}

impl Slots {
    fn retire(&mut self, id: TaskId, slot: &Slot) {
        self.retiring.entry(id).or_insert(false);
        slot.cancel.cancel();
    }
}

struct Inner {
    evaluator: Arc<dyn TaskEvaluator>,
    slots: Mutex<Slots>,
    shutdown: CancellationToken,
}

/// UpdateScheduler は id ごとのワーカーに再評価を振り分ける
///
/// clone しても同じスロット群を共有する。
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<Inner>,
}

impl UpdateScheduler {
    pub fn new(evaluator: Arc<dyn TaskEvaluator>, executor_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                evaluator,
                slots: Mutex::new(Slots {
                    live: ExpiringRegistry::new(executor_ttl),
                    retiring: HashMap::new(),
                }),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// `id` の再評価を依頼する。ブロックしない
    pub fn request_update(&self, id: TaskId) -> RequestOutcome {
        Inner::request_update(&self.inner, id)
    }

    /// TTL 切れのスロットを回収し、回収した数を返す
    pub fn sweep(&self) -> usize {
        let mut slots = self.inner.slots();
        let expired = slots.live.sweep(Instant::now(), Slot::is_busy);
        for (id, slot) in &expired {
            slots.retire(*id, slot);
            debug!(task_id = %id, "executor expired");
        }
        expired.len()
    }

    /// `id` のスロットをすぐに外す。実行中の評価は最後まで走る
    pub fn force_expire(&self, id: TaskId) -> bool {
        self.inner.force_expire(id)
    }

    pub fn active_slots(&self) -> usize {
        self.inner.slots().live.len()
    }

    pub fn is_tracking(&self, id: TaskId) -> bool {
        self.inner.slots().live.contains_key(&id)
    }

    /// 評価の切れ目で全スロットを止め、以降の要求を断る
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let released = self.inner.slots().live.drain();
        debug!(slots = released.len(), "scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_update(this: &Arc<Inner>, id: TaskId) -> RequestOutcome {
        if this.shutdown.is_cancelled() {
            return RequestOutcome::Stopped;
        }
        let now = Instant::now();
        let mut slots = this.slots();

        if let Some(waiting) = slots.retiring.get_mut(&id) {
            // replayed by the old worker on exit
            return if std::mem::replace(waiting, true) {
                RequestOutcome::Coalesced
            } else {
                RequestOutcome::Scheduled
            };
        }

        for _ in 0..2 {
            let slot = slots
                .live
                .get_or_insert_with(id, now, || Inner::spawn_slot(this, id))
                .clone();
            match slot.sender.try_send(()) {
                Ok(()) => {
                    slot.in_flight.fetch_add(1, Ordering::SeqCst);
                    return RequestOutcome::Scheduled;
                }
                Err(TrySendError::Full(())) => return RequestOutcome::Coalesced,
                Err(TrySendError::Closed(())) => {
                    // worker is gone; replace the slot once
                    slots.live.force_expire(&id);
                }
            }
        }
        warn!(task_id = %id, "could not start an executor");
        RequestOutcome::Stopped
    }

    fn force_expire(&self, id: TaskId) -> bool {
        let mut slots = self.slots();
        match slots.live.force_expire(&id) {
            Some(slot) => {
                slots.retire(id, &slot);
                debug!(task_id = %id, "executor released");
                true
            }
            None => false,
        }
    }

    fn spawn_slot(this: &Arc<Inner>, id: TaskId) -> Slot {
        let (sender, receiver) = mpsc::channel(1);
        let slot = Slot {
            sender,
            in_flight: Arc::new(AtomicUsize::new(0)),
            cancel: this.shutdown.child_token(),
        };
        debug!(task_id = %id, "executor created");
        tokio::spawn(run_slot(
            id,
            receiver,
            slot.clone_for_worker(),
            Arc::clone(&this.evaluator),
            Arc::downgrade(this),
        ));
        slot
    }

    /// `delay` 後に `id` を再要求する。先に停止したら何もしない
    fn request_after(this: &Arc<Inner>, id: TaskId, delay: Duration) {
        let inner = Arc::downgrade(this);
        let shutdown = this.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = inner.upgrade() {
                        Inner::request_update(&inner, id);
                    }
                }
            }
        });
    }
}

/// ワーカー側が持つスロットの情報。sender を持たないので、レジストリが
/// スロットを捨てるとチャネルが閉じる
struct WorkerSide {
    in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Slot {
    fn clone_for_worker(&self) -> WorkerSide {
        WorkerSide {
            in_flight: Arc::clone(&self.in_flight),
            cancel: self.cancel.clone(),
        }
    }
}

/// ワーカー終了時（panic も含む）に retiring の印を外し、
/// その間に来た要求があれば流し直す
struct ExitGuard {
    id: TaskId,
    inner: Weak<Inner>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let replay = inner.slots().retiring.remove(&self.id).unwrap_or(false);
        if replay {
            Inner::request_update(&inner, self.id);
        }
    }
}

async fn run_slot(
    id: TaskId,
    mut receiver: mpsc::Receiver<()>,
    side: WorkerSide,
    evaluator: Arc<dyn TaskEvaluator>,
    inner: Weak<Inner>,
) {
    let _exit = ExitGuard {
        id,
        inner: inner.clone(),
    };
    loop {
        let next = tokio::select! {
            biased;
            _ = side.cancel.cancelled() => None,
            msg = receiver.recv() => msg,
        };
        if next.is_none() {
            break;
        }

        let outcome = evaluator.evaluate(id).await;
        side.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(inner) = inner.upgrade() else {
            break;
        };
        match outcome {
            Ok(outcome) if outcome.is_final() => {
                debug!(task_id = %id, ?outcome, "task done, releasing executor");
                inner.force_expire(id);
                break;
            }
            Ok(EvaluationOutcome::Advanced { status, .. }) => {
                debug!(task_id = %id, %status, "advanced, re-evaluating");
                Inner::request_update(&inner, id);
            }
            Ok(EvaluationOutcome::Pending { retry_after }) => {
                debug!(task_id = %id, ?retry_after, "command pending, polling again later");
                Inner::request_after(&inner, id, retry_after);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(task_id = %id, error = %e, kind = ?e.kind(), "evaluation failed");
            }
        }
    }
}
