//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports のインメモリ実装を含めます。
//! テストのフェイクとしても、CLI のデモ用の配線としても使います。
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: タスクレコードの正本
//! - **InMemoryReplicates**: ワーカーの replicate 報告
//! - **ScriptedChain**: チェーン状態（答えをテスト側で設定できる）
//! - **ScriptedCommandClient**: チェーンアダプタ（状態の台本を設定できる）
//! - **TracingEventSink / RecordingEventSink**: イベント配送
//!
//! 本番用の実装（DB、チェーンノード、アダプタ API）は別クレートに置く想定。

pub mod event_sinks;
pub mod inmem_replicates;
pub mod inmem_store;
pub mod scripted_chain;
pub mod scripted_commands;

// 主要な型を再エクスポート
pub use self::event_sinks::{RecordingEventSink, TracingEventSink};
pub use self::inmem_replicates::InMemoryReplicates;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::scripted_chain::ScriptedChain;
pub use self::scripted_commands::ScriptedCommandClient;
