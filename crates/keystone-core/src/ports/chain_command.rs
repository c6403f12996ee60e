//! ChainCommandClient port - チェーンアダプタへの非同期コマンド
//!
//! コマンドは投げっぱなしで、結果は `get_status` でポーリングする。
//! ポーリングは `app::command_poller::CommandPoller` が担当する。

use async_trait::async_trait;

use crate::domain::{ChainDealId, ChainTaskId, CommandKind, CommandStatus, Result};

#[async_trait]
pub trait ChainCommandClient: Send + Sync {
    /// 受理されたらチェーン上のタスク id を返す。`None` は拒否。
    async fn request_initialize(
        &self,
        chain_deal_id: &ChainDealId,
        task_index: u32,
    ) -> Result<Option<ChainTaskId>>;

    async fn request_finalize(
        &self,
        chain_task_id: &ChainTaskId,
        result_link: &str,
        callback: &str,
    ) -> Result<Option<ChainTaskId>>;

    async fn get_status(&self, kind: CommandKind, chain_task_id: &ChainTaskId)
    -> Result<CommandStatus>;
}
