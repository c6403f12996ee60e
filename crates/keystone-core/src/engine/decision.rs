//! Decision - 1 回の評価パスで何をするか
//!
//! `decide` は純粋関数なので、戻り値はデータだけで表す。
//! 実際の保存・コマンド送信・イベント配送は `app::updater` が行う。

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::domain::{TaskStatus, WalletAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// このパスでは何も変えない
    Hold(HoldReason),
    Advance(Transition),
}

impl Decision {
    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold(_))
    }
}

/// 変更しなかった理由。どれもエラーではない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    Terminal,
    /// チェーン側の前提（未登録、期限、reveal 期間、reopen / finalize 可否）が揃っていない
    ChainNotReady,
    NotEnoughGas,
    /// 送ったコマンドがまだ終端ステータスを返していない
    CommandPending,
    WaitingForWorkers,
    WaitingForUpload,
    MissingResultLink,
}

impl HoldReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldReason::Terminal => "terminal",
            HoldReason::ChainNotReady => "chain_not_ready",
            HoldReason::NotEnoughGas => "not_enough_gas",
            HoldReason::CommandPending => "command_pending",
            HoldReason::WaitingForWorkers => "waiting_for_workers",
            HoldReason::WaitingForUpload => "waiting_for_upload",
            HoldReason::MissingResultLink => "missing_result_link",
        }
    }
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// status path を積む前にタスクへ当てるフィールド更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub uploading_worker: Option<WalletAddress>,
    pub result_link: Option<String>,
    pub contribution_deadline: Option<DateTime<Utc>>,
    pub reveal_deadline: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

/// path を保存したあとに実行する副作用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// initialize コマンドを送り、返ってきた chain task id を記録する
    SubmitInitialize,
    /// reopen トランザクションを送る
    Reopen,
    /// `worker` に結果のアップロードを依頼する
    RequestUpload { worker: WalletAddress },
    /// finalize コマンドを送る
    SubmitFinalize { result_link: String },
}

impl SideEffect {
    /// 成功時に積むステータス
    pub fn success_path(&self) -> &'static [TaskStatus] {
        match self {
            SideEffect::SubmitInitialize | SideEffect::RequestUpload { .. } => &[],
            SideEffect::Reopen => &[TaskStatus::Reopened, TaskStatus::Initialized],
            SideEffect::SubmitFinalize { .. } => &[TaskStatus::Finalizing],
        }
    }

    /// 拒否・失敗時に積むステータス
    pub fn failure_path(&self) -> &'static [TaskStatus] {
        match self {
            SideEffect::SubmitInitialize => &[TaskStatus::InitializeFailed, TaskStatus::Failed],
            SideEffect::Reopen => &[TaskStatus::ReopenFailed, TaskStatus::Failed],
            SideEffect::SubmitFinalize { .. } => &[TaskStatus::FinalizeFailed, TaskStatus::Failed],
            SideEffect::RequestUpload { .. } => &[],
        }
    }
}

/// Transition はライフサイクルの 1 ステップ
///
/// `patch` を当ててから `path` を順に積む。`path` が空になるのは副作用があるときだけ
/// （finalize は受理されて初めてステータスが進む）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub patch: TaskPatch,
    pub path: Vec<TaskStatus>,
    pub effect: Option<SideEffect>,
}

impl Transition {
    pub fn to(path: &[TaskStatus]) -> Self {
        Self {
            patch: TaskPatch::default(),
            path: path.to_vec(),
            effect: None,
        }
    }

    pub fn with_patch(mut self, patch: TaskPatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// 副作用を実行する前に到達する最後のステータス
    pub fn target(&self) -> Option<TaskStatus> {
        self.path.last().copied()
    }
}

/// 判定関数の調整値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    /// アップロード依頼が受理されないまま待つ時間。過ぎたら別の revealed ワーカーに依頼する
    pub upload_request_window: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        EnginePolicy::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EnginePolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            upload_request_window: config.upload_request_window,
        }
    }
}
