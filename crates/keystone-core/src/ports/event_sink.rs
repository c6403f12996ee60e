//! EventSink port - イベント配送の抽象化
//!
//! # 実装
//! - `impls::event_sinks::TracingEventSink`: ログに出すだけ
//! - `impls::event_sinks::RecordingEventSink`: テスト用に記録する

use async_trait::async_trait;

use crate::domain::{Result, TaskEvent};

/// EventSink はドメインイベントを配送
///
/// 配送の失敗は状態遷移を巻き戻さない（呼び出し側はログに残すだけ）。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: TaskEvent) -> Result<()>;
}
