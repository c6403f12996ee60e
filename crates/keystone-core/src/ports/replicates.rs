//! ReplicateQuery port - ワーカーが報告した replicate の集計

use async_trait::async_trait;

use crate::domain::{ChainTaskId, Replicate, ReplicateStatus, Result, WalletAddress};

#[async_trait]
pub trait ReplicateQuery: Send + Sync {
    /// 現在のステータスが `statuses` のいずれかである replicate の数
    async fn count_with_status(
        &self,
        chain_task_id: &ChainTaskId,
        statuses: &[ReplicateStatus],
    ) -> Result<u32>;

    /// 履歴のどこかに `status` を含む replicate の数
    async fn count_containing(
        &self,
        chain_task_id: &ChainTaskId,
        status: ReplicateStatus,
    ) -> Result<u32>;

    /// Revealed な replicate から一様ランダムに 1 つ選ぶ
    async fn sample_with_reveal_status(
        &self,
        chain_task_id: &ChainTaskId,
    ) -> Result<Option<Replicate>>;

    /// 結果をアップロード済みの replicate
    async fn get_with_result_uploaded_status(
        &self,
        chain_task_id: &ChainTaskId,
    ) -> Result<Option<Replicate>>;

    async fn find_replicate(
        &self,
        chain_task_id: &ChainTaskId,
        wallet: &WalletAddress,
    ) -> Result<Option<Replicate>>;
}
