//! keystone-core
//!
//! Orchestration core for off-chain compute tasks anchored on a blockchain.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, task, chain, replicate, command, events, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, ChainQuery, ChainCommandClient, ReplicateQuery, EventSink, Clock, IdGenerator）
//! - **engine**: 純粋な遷移判断（decide）と snapshot の収集
//! - **app**: アプリケーションロジック（builder, service, scheduler, updater, command_poller, detectors, reaper_loop）
//! - **impls**: 実装（InMemoryTaskStore など開発用）
//! - **config**: TOML 設定
//! - **observability**: tracing の初期化とステータス集計

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod impls;
pub mod observability;
pub mod ports;
