//! Observability - ログ初期化とステータス集計

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;
use crate::domain::{Task, TaskStatus};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level`. Returns an error if a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    }
}

/// Number of stored tasks per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub by_status: BTreeMap<String, usize>,
    pub total: usize,
    pub terminal: usize,
}

impl StatusCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = StatusCounts::default();
        for task in tasks {
            let status = task.current_status();
            *counts.by_status.entry(status.to_string()).or_default() += 1;
            counts.total += 1;
            if status.is_terminal() {
                counts.terminal += 1;
            }
        }
        counts
    }

    pub fn get(&self, status: TaskStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn in_flight(&self) -> usize {
        self.total - self.terminal
    }
}
