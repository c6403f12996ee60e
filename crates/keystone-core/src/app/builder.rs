//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - バックグラウンドループの起動と graceful shutdown

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConfigError, KeystoneConfig};
use crate::engine::{EnginePolicy, SnapshotReader};
use crate::impls::TracingEventSink;
use crate::ports::{
    ChainCommandClient, ChainQuery, Clock, EventSink, IdGenerator, ReplicateQuery, SystemClock,
    TaskStore, UlidGenerator,
};

use super::command_poller::CommandPoller;
use super::detectors::{
    ContributionTimeoutDetector, Detector, DetectorLoop, FinalDeadlineDetector,
    ResultUploadTimeoutDetector,
};
use super::reaper_loop::ReaperLoop;
use super::scheduler::UpdateScheduler;
use super::service::TaskService;
use super::updater::TaskUpdater;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let mut app = AppBuilder::new(config)
///     .task_store(store)
///     .chain(chain)
///     .chain_commands(commands)
///     .replicates(replicates)
///     .build()?;
/// app.start();
/// ```
///
/// # Fail-fast 設計
/// - 必須の port（TaskStore, ChainQuery, ChainCommandClient, ReplicateQuery）が
///   1 つでも欠けていれば BuildError::MissingPorts
/// - 設定が不正なら BuildError::InvalidConfig
/// - EventSink / Clock / IdGenerator は省略するとデフォルト実装
pub struct AppBuilder {
    config: KeystoneConfig,
    store: Option<Arc<dyn TaskStore>>,
    chain: Option<Arc<dyn ChainQuery>>,
    commands: Option<Arc<dyn ChainCommandClient>>,
    replicates: Option<Arc<dyn ReplicateQuery>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing ports: {0:?}. These collaborators must be provided before build().")]
    MissingPorts(Vec<&'static str>),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: KeystoneConfig) -> Self {
        Self {
            config,
            store: None,
            chain: None,
            commands: None,
            replicates: None,
            events: None,
            clock: None,
            ids: None,
        }
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn chain(mut self, chain: Arc<dyn ChainQuery>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn chain_commands(mut self, commands: Arc<dyn ChainCommandClient>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn replicates(mut self, replicates: Arc<dyn ReplicateQuery>) -> Self {
        self.replicates = Some(replicates);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// AppBuilder を検証して App を生成
    ///
    /// ループはまだ起動しない（`App::start` で起動）。
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("task_store");
        }
        if self.chain.is_none() {
            missing.push("chain");
        }
        if self.commands.is_none() {
            missing.push("chain_commands");
        }
        if self.replicates.is_none() {
            missing.push("replicates");
        }
        let (Some(store), Some(chain), Some(commands), Some(replicates)) =
            (self.store, self.chain, self.commands, self.replicates)
        else {
            return Err(BuildError::MissingPorts(missing));
        };

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let events: Arc<dyn EventSink> = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        let poller = Arc::new(CommandPoller::new(commands, &self.config.poller));
        let reader = SnapshotReader::new(
            Arc::clone(&chain),
            replicates,
            Arc::clone(&poller),
            Arc::clone(&clock),
        );
        let updater = TaskUpdater::new(
            Arc::clone(&store),
            reader,
            poller,
            chain,
            events,
            EnginePolicy::from(&self.config.engine),
        );
        let scheduler = UpdateScheduler::new(Arc::new(updater), self.config.scheduler.executor_ttl);
        let service = TaskService::new(store, scheduler.clone(), ids, clock);

        Ok(App {
            service,
            scheduler,
            config: self.config,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        })
    }
}

/// App はアプリケーションのランタイム
///
/// - `service`: タスク API
/// - `scheduler`: タスクごとの更新スケジューラ
/// - `start()` で ReaperLoop と DetectorLoop を起動、`shutdown()` で停止
pub struct App {
    pub service: TaskService,
    pub scheduler: UpdateScheduler,
    pub config: KeystoneConfig,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl App {
    /// バックグラウンドループを起動する。2 回目以降は何もしない
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }

        let reaper = ReaperLoop::new(self.scheduler.clone(), self.config.scheduler.sweep_interval);
        self.handles.push(tokio::spawn(reaper.run(self.shutdown.child_token())));

        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(FinalDeadlineDetector::new(self.service.clone())),
            Arc::new(ContributionTimeoutDetector::new(self.service.clone())),
            Arc::new(ResultUploadTimeoutDetector::new(
                self.service.clone(),
                self.config.engine.upload_request_window,
            )),
        ];
        let detector_loop = DetectorLoop::new(detectors, self.config.detectors.interval);
        self.handles
            .push(tokio::spawn(detector_loop.run(self.shutdown.child_token())));

        info!(
            executor_ttl = ?self.config.scheduler.executor_ttl,
            detector_interval = ?self.config.detectors.interval,
            "keystone started"
        );
    }

    /// ループとスケジューラを止め、ループの終了を待つ
    ///
    /// 実行中の評価は最後まで走らせる。
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.scheduler.shutdown();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("keystone stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryReplicates, InMemoryTaskStore, ScriptedChain, ScriptedCommandClient};
    use std::time::Duration;

    fn full_builder() -> AppBuilder {
        AppBuilder::new(KeystoneConfig::default())
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .chain(Arc::new(ScriptedChain::new()))
            .chain_commands(Arc::new(ScriptedCommandClient::new()))
            .replicates(Arc::new(InMemoryReplicates::new()))
    }

    #[test]
    fn test_build_success() {
        assert!(full_builder().build().is_ok());
    }

    #[test]
    fn test_build_missing_ports() {
        let app = AppBuilder::new(KeystoneConfig::default())
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .replicates(Arc::new(InMemoryReplicates::new()))
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingPorts(missing)) if missing == vec!["chain", "chain_commands"]
        ));
    }

    #[test]
    fn test_build_invalid_config() {
        let mut config = KeystoneConfig::default();
        config.poller.max_attempts = 0;
        let app = AppBuilder::new(config)
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .chain(Arc::new(ScriptedChain::new()))
            .chain_commands(Arc::new(ScriptedCommandClient::new()))
            .replicates(Arc::new(InMemoryReplicates::new()))
            .build();
        assert!(matches!(app, Err(BuildError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut config = KeystoneConfig::default();
        config.scheduler.sweep_interval = Duration::from_millis(5);
        config.detectors.interval = Duration::from_millis(5);
        let mut app = AppBuilder::new(config)
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .chain(Arc::new(ScriptedChain::new()))
            .chain_commands(Arc::new(ScriptedCommandClient::new()))
            .replicates(Arc::new(InMemoryReplicates::new()))
            .build()
            .unwrap();

        app.start();
        app.start();
        assert_eq!(app.handles.len(), 2);

        let scheduler = app.scheduler.clone();
        tokio::time::sleep(Duration::from_millis(20)).await;
        app.shutdown().await;
        assert!(scheduler.is_shut_down());
    }
}
