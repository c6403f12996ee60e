//! Detectors - 期限切れの検出と再評価の依頼
//!
//! 検出器は遷移を行わない。条件に当てはまるタスクを見つけて
//! `TaskService::update_task` を呼ぶだけで、実際の判断はエンジンが行う。
//!
//! - FinalDeadlineDetector: final deadline を過ぎたタスク
//! - ContributionTimeoutDetector: contribution deadline を過ぎた initialized/running
//! - ResultUploadTimeoutDetector: アップロード待ちのまま期限や依頼ウィンドウを過ぎたタスク

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Result, Task, TaskStatus};
use crate::ports::Clock;

use super::service::TaskService;

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// 条件に合うタスクすべてに再評価を依頼し、件数を返す
    async fn detect(&self) -> Result<usize>;
}

fn trigger(service: &TaskService, detector: &'static str, tasks: &[Task]) -> usize {
    for task in tasks {
        debug!(detector, task_id = %task.id, status = %task.current_status(), "detected");
        service.update_task(task.id);
    }
    tasks.len()
}

pub struct FinalDeadlineDetector {
    service: TaskService,
}

impl FinalDeadlineDetector {
    pub fn new(service: TaskService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Detector for FinalDeadlineDetector {
    fn name(&self) -> &'static str {
        "final_deadline"
    }

    async fn detect(&self) -> Result<usize> {
        let now = self.service.clock().now();
        let expired: Vec<Task> = self
            .service
            .tasks_where_final_deadline_is_possible()
            .await?
            .into_iter()
            .filter(|task| task.is_past_final_deadline(now))
            .collect();
        Ok(trigger(&self.service, self.name(), &expired))
    }
}

pub struct ContributionTimeoutDetector {
    service: TaskService,
}

impl ContributionTimeoutDetector {
    pub fn new(service: TaskService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Detector for ContributionTimeoutDetector {
    fn name(&self) -> &'static str {
        "contribution_timeout"
    }

    async fn detect(&self) -> Result<usize> {
        let now = self.service.clock().now();
        let late: Vec<Task> = self
            .service
            .initialized_or_running_tasks()
            .await?
            .into_iter()
            .filter(|task| now > task.contribution_deadline)
            .collect();
        Ok(trigger(&self.service, self.name(), &late))
    }
}

pub struct ResultUploadTimeoutDetector {
    service: TaskService,
    upload_request_window: Duration,
}

impl ResultUploadTimeoutDetector {
    pub fn new(service: TaskService, upload_request_window: Duration) -> Self {
        Self {
            service,
            upload_request_window,
        }
    }

    fn is_stuck(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if task.is_past_final_deadline(now) {
            return true;
        }
        let Ok(window) = chrono::Duration::from_std(self.upload_request_window) else {
            return false;
        };
        task.current_status() == TaskStatus::ResultUploadRequested
            && task
                .last_entered(TaskStatus::ResultUploadRequested)
                .is_some_and(|requested| now > requested + window)
    }
}

#[async_trait]
impl Detector for ResultUploadTimeoutDetector {
    fn name(&self) -> &'static str {
        "result_upload_timeout"
    }

    async fn detect(&self) -> Result<usize> {
        let now = self.service.clock().now();
        let stuck: Vec<Task> = self
            .service
            .find_by_current_status(&[
                TaskStatus::ResultUploadRequested,
                TaskStatus::ResultUploading,
            ])
            .await?
            .into_iter()
            .filter(|task| self.is_stuck(task, now))
            .collect();
        Ok(trigger(&self.service, self.name(), &stuck))
    }
}

/// DetectorLoop は停止するまで `interval` ごとに全検出器を 1 回ずつ走らせる
pub struct DetectorLoop {
    detectors: Vec<Arc<dyn Detector>>,
    interval: Duration,
}

impl DetectorLoop {
    pub fn new(detectors: Vec<Arc<dyn Detector>>, interval: Duration) -> Self {
        Self {
            detectors,
            interval,
        }
    }

    /// 全検出器を 1 回走らせ、ヒット数の合計を返す
    pub async fn run_once(&self) -> usize {
        let mut hits = 0;
        for detector in &self.detectors {
            match detector.detect().await {
                Ok(0) => {}
                Ok(n) => {
                    info!(detector = detector.name(), tasks = n, "detector triggered updates");
                    hits += n;
                }
                Err(e) => warn!(detector = detector.name(), error = %e, "detector failed"),
            }
        }
        hits
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        debug!("detector loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::scheduler::{EvaluationOutcome, TaskEvaluator, UpdateScheduler};
    use crate::domain::task::fixtures::{t0, task_at};
    use crate::domain::TaskId;
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{FixedClock, TaskStore, UlidGenerator};
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    use TaskStatus::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<TaskId>>,
    }

    #[async_trait]
    impl TaskEvaluator for Recorder {
        async fn evaluate(&self, id: TaskId) -> Result<EvaluationOutcome> {
            self.seen.lock().unwrap().push(id);
            Ok(EvaluationOutcome::Unchanged { terminal: false })
        }
    }

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        clock: FixedClock,
        service: TaskService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let clock = FixedClock::new(t0());
        let scheduler =
            UpdateScheduler::new(Arc::new(Recorder::default()), Duration::from_secs(60));
        let service = TaskService::new(
            store.clone(),
            scheduler,
            Arc::new(UlidGenerator::new(clock.clone())),
            Arc::new(clock.clone()),
        );
        Fixture {
            store,
            clock,
            service,
        }
    }

    async fn store_at(f: &Fixture, path: &[TaskStatus]) {
        f.store.save(task_at(path, t0())).await.unwrap();
    }

    #[tokio::test]
    async fn final_deadline_detector_skips_terminal_and_already_reached() {
        let f = fixture();
        store_at(&f, &[]).await;
        store_at(&f, &[Initializing, Initialized, Running]).await;
        store_at(&f, &[FinalDeadlineReached]).await;
        store_at(&f, &[Initializing, InitializeFailed, Failed]).await;
        let detector = FinalDeadlineDetector::new(f.service.clone());

        assert_eq!(detector.detect().await.unwrap(), 0);
        f.clock.advance(ChronoDuration::minutes(61));
        assert_eq!(detector.detect().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn contribution_timeout_detector_looks_at_initialized_and_running() {
        let f = fixture();
        store_at(&f, &[Initializing, Initialized]).await;
        store_at(&f, &[Initializing, Initialized, Running]).await;
        store_at(&f, &[Initializing]).await;
        let detector = ContributionTimeoutDetector::new(f.service.clone());

        f.clock.advance(ChronoDuration::minutes(29));
        assert_eq!(detector.detect().await.unwrap(), 0);
        f.clock.advance(ChronoDuration::minutes(2));
        assert_eq!(detector.detect().await.unwrap(), 2);
    }

    const UPLOAD_PATH: [TaskStatus; 6] = [
        Initializing,
        Initialized,
        Running,
        ConsensusReached,
        AtLeastOneRevealed,
        ResultUploadRequested,
    ];

    #[tokio::test]
    async fn upload_detector_fires_after_the_request_window() {
        let f = fixture();
        store_at(&f, &UPLOAD_PATH).await;
        let detector = ResultUploadTimeoutDetector::new(f.service.clone(), Duration::from_secs(120));

        f.clock.advance(ChronoDuration::seconds(60));
        assert_eq!(detector.detect().await.unwrap(), 0);
        f.clock.advance(ChronoDuration::seconds(61));
        assert_eq!(detector.detect().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upload_detector_fires_past_the_final_deadline() {
        let f = fixture();
        let mut path = UPLOAD_PATH.to_vec();
        path.push(ResultUploading);
        store_at(&f, &path).await;
        let detector = ResultUploadTimeoutDetector::new(f.service.clone(), Duration::from_secs(120));

        // uploading tasks ignore the request window
        f.clock.advance(ChronoDuration::minutes(10));
        assert_eq!(detector.detect().await.unwrap(), 0);
        f.clock.advance(ChronoDuration::minutes(51));
        assert_eq!(detector.detect().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn loop_sums_hits_across_detectors() {
        let f = fixture();
        store_at(&f, &[Initializing, Initialized]).await;
        f.clock.advance(ChronoDuration::minutes(61));

        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(FinalDeadlineDetector::new(f.service.clone())),
            Arc::new(ContributionTimeoutDetector::new(f.service.clone())),
        ];
        let detector_loop = DetectorLoop::new(detectors, Duration::from_secs(30));

        assert_eq!(detector_loop.run_once().await, 2);
    }
}
