//! ReaperLoop - 期限切れ executor の回収
//!
//! # フロー
//! 1. `sweep_interval` ごとに起きる
//! 2. UpdateScheduler::sweep() で TTL 切れのスロットを回収
//! 3. shutdown トークンが来たら抜ける

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::scheduler::UpdateScheduler;

/// ReaperLoop は UpdateScheduler の idle スロットを定期的に回収
pub struct ReaperLoop {
    scheduler: UpdateScheduler,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(scheduler: UpdateScheduler, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let reclaimed = self.scheduler.sweep();
                    if reclaimed > 0 {
                        debug!(reclaimed, active = self.scheduler.active_slots(), "executors reclaimed");
                    }
                }
            }
        }
        debug!("reaper loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::scheduler::{EvaluationOutcome, TaskEvaluator};
    use crate::domain::{Result, TaskId};
    use async_trait::async_trait;
    use std::sync::Arc;
    use ulid::Ulid;

    struct Idle;

    #[async_trait]
    impl TaskEvaluator for Idle {
        async fn evaluate(&self, _id: TaskId) -> Result<EvaluationOutcome> {
            Ok(EvaluationOutcome::Unchanged { terminal: false })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reclaims_idle_executors_and_stops_on_shutdown() {
        let ttl = Duration::from_secs(60);
        let scheduler = UpdateScheduler::new(Arc::new(Idle), ttl);
        scheduler.request_update(TaskId::from_ulid(Ulid::new()));
        tokio::task::yield_now().await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            ReaperLoop::new(scheduler.clone(), Duration::from_secs(10)).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.active_slots(), 1);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(scheduler.active_slots(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
