//! App - アプリケーション層
//!
//! このモジュールは、ports と engine を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **TaskService**: タスクの登録・検索・再評価依頼
//! - **UpdateScheduler**: タスクごとに直列化・合流された再評価
//! - **TaskUpdater**: 1 回の評価パス（snapshot→decide→保存→副作用→イベント）
//! - **CommandPoller**: チェーンコマンドの送信とポーリング
//! - **ReaperLoop**: idle な executor の回収
//! - **DetectorLoop**: 期限切れタスクの検出

pub mod builder;
pub mod command_poller;
pub mod detectors;
pub mod reaper_loop;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod updater;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::command_poller::CommandPoller;
pub use self::detectors::{
    ContributionTimeoutDetector, Detector, DetectorLoop, FinalDeadlineDetector,
    ResultUploadTimeoutDetector,
};
pub use self::reaper_loop::ReaperLoop;
pub use self::registry::ExpiringRegistry;
pub use self::scheduler::{EvaluationOutcome, RequestOutcome, TaskEvaluator, UpdateScheduler};
pub use self::service::TaskService;
pub use self::updater::TaskUpdater;
