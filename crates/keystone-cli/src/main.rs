use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};
use tracing::{info, warn};

use keystone_core::app::{AppBuilder, TaskService};
use keystone_core::config::{KeystoneConfig, load_config};
use keystone_core::domain::{
    ChainDealId, ChainTask, ChainTaskStatus, NewTask, ReplicateStatus, Task, TaskId, TaskStatus,
    TaskStatusChange, WalletAddress,
};
use keystone_core::impls::{
    InMemoryReplicates, InMemoryTaskStore, ScriptedChain, ScriptedCommandClient, TracingEventSink,
};
use keystone_core::observability::init_tracing;

const DEMO_DEAL: &str = "0xd82223e5feff6720792ffed1665e980da95e5d32b177332013eaba8edc07f31c";

/// Drive demo deals through the task lifecycle against in-memory collaborators.
#[derive(Debug, Parser)]
#[command(name = "keystone", version)]
struct Args {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of demo tasks to run.
    #[arg(long, default_value_t = 3)]
    deals: u32,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct TaskReport<'a> {
    task_id: TaskId,
    task_index: u32,
    status: TaskStatus,
    result_link: Option<&'a str>,
    history: &'a [TaskStatusChange],
}

/// Plays the worker pool: reacts to each task's status with the replicate
/// reports a healthy pool would send, then pokes the task.
struct SimulatedWorkers {
    service: TaskService,
    chain: Arc<ScriptedChain>,
    replicates: Arc<InMemoryReplicates>,
}

impl SimulatedWorkers {
    fn wallets(task: &Task) -> Vec<WalletAddress> {
        (1..=task.workers_required)
            .map(|n| WalletAddress::new(format!("0xworker{n:02}")))
            .collect()
    }

    async fn step(&self, task: &Task) {
        let Some(chain_task_id) = task.chain_task_id.as_ref() else {
            return;
        };
        let wallets = Self::wallets(task);
        match task.current_status() {
            TaskStatus::Initialized => {
                for wallet in &wallets {
                    self.replicates
                        .report(chain_task_id, wallet, ReplicateStatus::Starting);
                }
            }
            TaskStatus::Running => {
                for wallet in &wallets {
                    self.replicates
                        .report(chain_task_id, wallet, ReplicateStatus::Computed);
                    self.replicates
                        .report(chain_task_id, wallet, ReplicateStatus::Contributed);
                }
                self.chain
                    .set_chain_status(chain_task_id, ChainTaskStatus::Revealing);
            }
            TaskStatus::ConsensusReached => {
                for wallet in &wallets {
                    self.replicates
                        .report(chain_task_id, wallet, ReplicateStatus::Revealed);
                }
            }
            TaskStatus::ResultUploadRequested => {
                if let Some(worker) = task.uploading_worker.as_ref() {
                    self.replicates
                        .report(chain_task_id, worker, ReplicateStatus::ResultUploading);
                }
            }
            TaskStatus::ResultUploading => {
                if let Some(worker) = task.uploading_worker.as_ref() {
                    let link = format!("https://results.example/{chain_task_id}");
                    self.replicates.report_uploaded(chain_task_id, worker, &link);
                }
            }
            _ => return,
        }
        self.service.update_task(task.id);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => KeystoneConfig::default(),
    };
    init_tracing(&config.logging)?;

    // (A) in-memory collaborators
    let store = Arc::new(InMemoryTaskStore::new());
    let chain = Arc::new(ScriptedChain::new());
    let commands = Arc::new(ScriptedCommandClient::new());
    let replicates = Arc::new(InMemoryReplicates::new());

    let mut app = AppBuilder::new(config)
        .task_store(store.clone())
        .chain(chain.clone())
        .chain_commands(commands)
        .replicates(replicates.clone())
        .event_sink(Arc::new(TracingEventSink))
        .build()?;
    app.start();

    // (B) accept the demo deal; the chain answers with an active task per index
    let deal = ChainDealId::new(DEMO_DEAL);
    let now = Utc::now();
    let mut ids = Vec::new();
    for index in 0..args.deals {
        let chain_task_id = ScriptedCommandClient::derived_chain_task_id(&deal, index);
        chain.set_chain_task(
            &chain_task_id,
            ChainTask {
                status: ChainTaskStatus::Active,
                contribution_deadline: now + ChronoDuration::minutes(20),
                reveal_deadline: now + ChronoDuration::minutes(40),
                final_deadline: now + ChronoDuration::minutes(60),
                winner_count: 2,
                reveal_counter: 0,
            },
        );

        let spec = NewTask {
            chain_deal_id: deal.clone(),
            task_index: index,
            app_name: "demo-app".to_string(),
            command_line: format!("--index {index}"),
            workers_required: 2,
            max_execution_time_secs: 60,
            tag: "0x0".to_string(),
            contribution_deadline: now + ChronoDuration::minutes(30),
            final_deadline: now + ChronoDuration::minutes(60),
            callback: None,
        };
        if let Some(task) = app.service.add_task(spec).await? {
            ids.push(task.id);
        }
    }
    info!(tasks = ids.len(), "demo deal accepted");

    // (C) play the workers until every task is terminal
    let workers = SimulatedWorkers {
        service: app.service.clone(),
        chain,
        replicates,
    };
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    loop {
        let pending = app.service.tasks_in_non_final_statuses().await?;
        if pending.is_empty() {
            break;
        }
        if Instant::now() >= deadline {
            warn!(pending = pending.len(), "timed out before every task finished");
            break;
        }
        for task in &pending {
            workers.step(task).await;
        }
        sleep(Duration::from_millis(50)).await;
    }

    // (D) report
    let counts = app.service.counts_by_status().await?;
    let tasks = store.all();
    let reports: Vec<TaskReport<'_>> = tasks
        .iter()
        .map(|task| TaskReport {
            task_id: task.id,
            task_index: task.task_index,
            status: task.current_status(),
            result_link: task.result_link.as_deref(),
            history: task.status_history(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    println!("{}", serde_json::to_string_pretty(&counts)?);

    app.shutdown().await;
    Ok(())
}
