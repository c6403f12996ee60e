//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（タスクストア、チェーン、チェーンアダプタ、
//! ワーカーの replicate 情報）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - タスクストアが source of truth（正本）
//! - チェーンの状態は読み取り専用（reopen だけは直接トランザクションを送る）
//! - 非同期コマンド（initialize / finalize）はチェーンアダプタ経由で投げてポーリングする
//! - すべての trait は async で `Result<_, KeystoneError>` を返す

pub mod chain;
pub mod chain_command;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod replicates;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::chain::ChainQuery;
pub use self::chain_command::ChainCommandClient;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::replicates::ReplicateQuery;
pub use self::task_store::TaskStore;
