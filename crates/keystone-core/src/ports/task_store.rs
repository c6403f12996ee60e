//! TaskStore port - タスクレコードの正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - タスクレコード（状態、履歴、期限、アップロード担当など）
//! - (deal, index) による重複登録の検出
//! - 検出器が使う述語ベースの検索

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ChainDealId, ChainTaskId, Result, Task, TaskId, TaskStatus};

/// TaskStore は状態・履歴の正本
///
/// # 設計原則
/// - 同じ id に対しては read-your-writes（save 直後の find_by_id は保存内容を返す）
/// - 変更はすべて read-modify-write で `save` を通す
/// - 同じ id への書き込みはスケジューラが直列化するので、ストア側でのロックは不要
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>>;

    async fn find_by_chain_task_id(&self, chain_task_id: &ChainTaskId) -> Result<Option<Task>>;

    async fn find_by_deal_and_index(
        &self,
        chain_deal_id: &ChainDealId,
        task_index: u32,
    ) -> Result<Option<Task>>;

    /// 保存して、保存後のレコードを返す
    async fn save(&self, task: Task) -> Result<Task>;

    async fn find_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>>;

    async fn find_by_status_not_in(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>>;

    /// final deadline が `before` より前のタスク id
    async fn find_ids_with_final_deadline_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TaskId>>;
}
