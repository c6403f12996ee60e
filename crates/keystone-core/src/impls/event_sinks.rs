//! EventSink の実装
//!
//! - TracingEventSink: イベントを構造化ログに出す（デフォルト）
//! - RecordingEventSink: テスト用にメモリへ記録する

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::domain::{KeystoneError, Result, TaskEvent};
use crate::ports::EventSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: TaskEvent) -> Result<()> {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(task_id = %event.task_id(), event = %payload, "task event");
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<TaskEvent>>,
    failing: Mutex<bool>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reject every event (delivery failures must not undo transitions).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: TaskEvent) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(KeystoneError::Store("event sink rejected event".to_string()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
