//! InMemoryTaskStore - 開発用・テスト用のタスクストア
//!
//! HashMap<TaskId, Task> を Mutex で守るだけの実装。
//! ロックは同期処理の中で完結させ、await を跨がない。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{ChainDealId, ChainTaskId, KeystoneError, Result, Task, TaskId, TaskStatus};
use crate::ports::TaskStore;

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    fail_saves: Mutex<bool>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail (for error-path tests).
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all stored tasks.
    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, pred: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut found: Vec<Task> = self.lock().values().filter(|t| pred(t)).cloned().collect();
        found.sort_by_key(|t| t.id);
        found
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_chain_task_id(&self, chain_task_id: &ChainTaskId) -> Result<Option<Task>> {
        Ok(self
            .lock()
            .values()
            .find(|t| t.chain_task_id.as_ref() == Some(chain_task_id))
            .cloned())
    }

    async fn find_by_deal_and_index(
        &self,
        chain_deal_id: &ChainDealId,
        task_index: u32,
    ) -> Result<Option<Task>> {
        Ok(self
            .lock()
            .values()
            .find(|t| &t.chain_deal_id == chain_deal_id && t.task_index == task_index)
            .cloned())
    }

    async fn save(&self, task: Task) -> Result<Task> {
        if *self.fail_saves.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(KeystoneError::Store(format!("save of {} refused", task.id)));
        }
        self.lock().insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        Ok(self.select(|t| statuses.contains(&t.current_status())))
    }

    async fn find_by_status_not_in(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        Ok(self.select(|t| !statuses.contains(&t.current_status())))
    }

    async fn find_ids_with_final_deadline_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TaskId>> {
        Ok(self
            .select(|t| t.final_deadline < before)
            .into_iter()
            .map(|t| t.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::fixtures::{t0, task_at};
    use chrono::Duration;

    #[tokio::test]
    async fn save_then_find_reads_own_write() {
        let store = InMemoryTaskStore::new();
        let mut task = task_at(&[], t0());
        store.save(task.clone()).await.unwrap();

        task.change_status(TaskStatus::Initializing, t0()).unwrap();
        store.save(task.clone()).await.unwrap();

        let found = store.find_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(found.current_status(), TaskStatus::Initializing);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn status_queries_split_the_store() {
        let store = InMemoryTaskStore::new();
        let received = task_at(&[], t0());
        let failed = task_at(&[TaskStatus::Failed], t0());
        store.save(received.clone()).await.unwrap();
        store.save(failed.clone()).await.unwrap();

        let active = store
            .find_by_status_not_in(TaskStatus::final_statuses())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, received.id);

        let done = store.find_by_status(&[TaskStatus::Failed]).await.unwrap();
        assert_eq!(done[0].id, failed.id);
    }

    #[tokio::test]
    async fn finds_by_chain_id_and_deal() {
        let store = InMemoryTaskStore::new();
        let task = task_at(&[], t0());
        store.save(task.clone()).await.unwrap();

        let chain_id = task.chain_task_id.clone().unwrap();
        assert!(store.find_by_chain_task_id(&chain_id).await.unwrap().is_some());
        assert!(
            store
                .find_by_deal_and_index(&task.chain_deal_id, 0)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_deal_and_index(&task.chain_deal_id, 1)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn final_deadline_query_is_strict() {
        let store = InMemoryTaskStore::new();
        let task = task_at(&[], t0());
        store.save(task.clone()).await.unwrap();

        let at_deadline = store
            .find_ids_with_final_deadline_before(task.final_deadline)
            .await
            .unwrap();
        assert!(at_deadline.is_empty());

        let after = store
            .find_ids_with_final_deadline_before(task.final_deadline + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(after, vec![task.id]);
    }

    #[tokio::test]
    async fn failing_saves_surface_store_errors() {
        let store = InMemoryTaskStore::new();
        store.fail_saves(true);
        let err = store.save(task_at(&[], t0())).await.unwrap_err();
        assert!(matches!(err, KeystoneError::Store(_)));
        assert!(store.is_empty());
    }
}
