//! TaskService - タスクのアプリケーション API
//!
//! 外部（deal の受付、ワーカーからの通知、検出器、CLI）はここを通してタスクを扱う。
//! 状態遷移そのものは行わず、`update_task` で UpdateScheduler に再評価を依頼するだけ。

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{ChainTaskId, NewTask, Result, Task, TaskId, TaskStatus};
use crate::observability::StatusCounts;
use crate::ports::{Clock, IdGenerator, TaskStore};

use super::scheduler::{RequestOutcome, UpdateScheduler};

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    scheduler: UpdateScheduler,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        scheduler: UpdateScheduler,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            ids,
            clock,
        }
    }

    /// 受け付けた deal のタスクを登録し、最初の評価を依頼する
    ///
    /// 同じ `(deal, index)` のタスクがすでにあれば `None`。
    pub async fn add_task(&self, spec: NewTask) -> Result<Option<Task>> {
        if let Some(existing) = self
            .store
            .find_by_deal_and_index(&spec.chain_deal_id, spec.task_index)
            .await?
        {
            info!(
                task_id = %existing.id,
                chain_deal_id = %spec.chain_deal_id,
                task_index = spec.task_index,
                "task already added"
            );
            return Ok(None);
        }

        let task = Task::new(self.ids.generate_task_id(), spec, self.clock.now());
        let task = self.store.save(task).await?;
        info!(
            task_id = %task.id,
            chain_deal_id = %task.chain_deal_id,
            task_index = task.task_index,
            "task added"
        );
        self.scheduler.request_update(task.id);
        Ok(Some(task))
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.store.find_by_id(id).await
    }

    pub async fn get_task_by_chain_task_id(&self, chain_task_id: &ChainTaskId) -> Result<Option<Task>> {
        self.store.find_by_chain_task_id(chain_task_id).await
    }

    pub async fn find_by_current_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        self.store.find_by_status(statuses).await
    }

    pub async fn initialized_or_running_tasks(&self) -> Result<Vec<Task>> {
        self.store
            .find_by_status(&[TaskStatus::Initialized, TaskStatus::Running])
            .await
    }

    pub async fn tasks_in_non_final_statuses(&self) -> Result<Vec<Task>> {
        self.store
            .find_by_status_not_in(TaskStatus::final_statuses())
            .await
    }

    pub async fn tasks_where_final_deadline_is_possible(&self) -> Result<Vec<Task>> {
        self.store
            .find_by_status_not_in(TaskStatus::statuses_where_final_deadline_is_impossible())
            .await
    }

    /// final deadline が `date` より前のタスクの chain id
    pub async fn chain_task_ids_of_tasks_expired_before(
        &self,
        date: DateTime<Utc>,
    ) -> Result<Vec<ChainTaskId>> {
        let ids = self.store.find_ids_with_final_deadline_before(date).await?;
        let mut chain_task_ids = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chain_task_id) = self
                .store
                .find_by_id(id)
                .await?
                .and_then(|task| task.chain_task_id)
            {
                chain_task_ids.push(chain_task_id);
            }
        }
        Ok(chain_task_ids)
    }

    /// タスクが存在し、final deadline を過ぎているか
    pub async fn is_expired(&self, chain_task_id: &ChainTaskId) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_by_chain_task_id(chain_task_id)
            .await?
            .is_some_and(|task| task.is_past_final_deadline(now)))
    }

    /// `id` の再評価を依頼する。実行は待たない
    pub fn update_task(&self, id: TaskId) -> RequestOutcome {
        let outcome = self.scheduler.request_update(id);
        debug!(task_id = %id, ?outcome, "update requested");
        outcome
    }

    /// chain id しか知らない呼び出し元向けの `update_task`
    /// その chain id のタスクがなければ `None`。
    pub async fn update_task_by_chain_id(
        &self,
        chain_task_id: &ChainTaskId,
    ) -> Result<Option<RequestOutcome>> {
        let task = self.store.find_by_chain_task_id(chain_task_id).await?;
        Ok(task.map(|task| self.update_task(task.id)))
    }

    pub async fn counts_by_status(&self) -> Result<StatusCounts> {
        let tasks = self.store.find_by_status(&TaskStatus::ALL).await?;
        Ok(StatusCounts::from_tasks(&tasks))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
