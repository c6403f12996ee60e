//! Engine - タスクのライフサイクル判定
//!
//! - **snapshot**: 1 パス分の外部状態を集める
//! - **lifecycle**: `(task, snapshot)` から次の遷移を決める純粋関数
//! - **decision**: 判定結果（Hold / Advance、パッチ、副作用）

pub mod decision;
pub mod lifecycle;
pub mod snapshot;

pub use self::decision::{Decision, EnginePolicy, HoldReason, SideEffect, TaskPatch, Transition};
pub use self::lifecycle::{decide, events_for};
pub use self::snapshot::{ReplicateCounts, Snapshot, SnapshotReader};
