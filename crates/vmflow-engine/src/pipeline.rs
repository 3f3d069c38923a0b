//! パイプライン
//!
//! 固定順のステージを順に実行します。致命的なステージが失敗すると
//! 以降のステージは実行せずに中断し、回復可能なステージの失敗は
//! 警告として記録して続行します。

use crate::error::{PipelineError, StageError};
use crate::poller::{PollEvent, PollObserver};
use crate::stages::{ArtifactStager, DeployOptions};
use crate::validation::ValidationReport;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use vmflow_core::{DeploymentConfig, VmIdentity};
use vmflow_hypervisor::{Hypervisor, RemoteShell};

/// 失敗時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fatality {
    /// 失敗したらパイプラインを中断
    Fatal,
    /// 失敗しても警告を出して続行
    Recoverable,
}

/// ステージが返す付帯情報
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
    pub validation: Option<ValidationReport>,
}

impl StageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

/// 進捗の受け取り手
///
/// デフォルト実装は何もしません。
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _index: usize, _total: usize, _name: &str) {}

    fn stage_finished(&self, _name: &str, _record: &StageRecord) {}

    fn poll_event(&self, _event: PollEvent<'_>) {}
}

/// 何も表示しないオブザーバー
pub struct QuietObserver;

impl PipelineObserver for QuietObserver {}

/// [`PipelineObserver`] をポーラーに渡すためのアダプター
pub struct ForwardPollEvents<'a>(pub &'a dyn PipelineObserver);

impl PollObserver for ForwardPollEvents<'_> {
    fn on_event(&mut self, event: PollEvent<'_>) {
        self.0.poll_event(event);
    }
}

/// ステージに渡す共有コンテキスト
pub struct StageContext<'a> {
    pub config: &'a DeploymentConfig,
    pub hypervisor: &'a dyn Hypervisor,
    pub shell: &'a dyn RemoteShell,
    pub stager: &'a dyn ArtifactStager,
    pub options: &'a DeployOptions,
    pub observer: &'a dyn PipelineObserver,
}

/// パイプラインの1ステージ
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError>;
}

/// 失敗時の扱い付きステージ
pub struct PipelineStage {
    pub stage: Box<dyn Stage>,
    pub fatality: Fatality,
}

impl PipelineStage {
    pub fn fatal(stage: impl Stage + 'static) -> Self {
        Self {
            stage: Box::new(stage),
            fatality: Fatality::Fatal,
        }
    }

    pub fn recoverable(stage: impl Stage + 'static) -> Self {
        Self {
            stage: Box::new(stage),
            fatality: Fatality::Recoverable,
        }
    }
}

/// パイプラインの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running(String),
    Completed,
    Aborted(String),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::NotStarted => write!(f, "not started"),
            PipelineState::Running(stage) => write!(f, "running ({stage})"),
            PipelineState::Completed => write!(f, "completed"),
            PipelineState::Aborted(stage) => write!(f, "aborted at {stage}"),
        }
    }
}

/// ステージの結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// 回復可能なステージが失敗した
    Recovered(String),
    /// 致命的なステージが失敗した
    Failed(String),
}

/// 実行済みステージの記録
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub fatality: Fatality,
    pub status: StageStatus,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
    pub validation: Option<ValidationReport>,
    pub duration_ms: u64,
}

/// パイプラインの実行結果
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageRecord>,
}

impl PipelineReport {
    /// 全ステージの警告
    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.stages.iter().flat_map(|record| {
            let recovered = match &record.status {
                StageStatus::Recovered(error) => Some(error.as_str()),
                _ => None,
            };
            record
                .warnings
                .iter()
                .map(String::as_str)
                .chain(recovered)
                .map(move |w| (record.name.as_str(), w))
        })
    }

    pub fn record(&self, stage: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.name == stage)
    }

    pub fn validation_for(&self, stage: &str) -> Option<&ValidationReport> {
        self.record(stage).and_then(|r| r.validation.as_ref())
    }
}

/// 固定順のステージ列
pub struct Pipeline {
    stages: Vec<PipelineStage>,
    state: PipelineState,
    report: PipelineReport,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self {
            stages,
            state: PipelineState::NotStarted,
            report: PipelineReport::default(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// 実行済みステージの記録（中断時も参照できる）
    pub fn report(&self) -> &PipelineReport {
        &self.report
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage.name()).collect()
    }

    /// 全ステージを順に実行する
    pub async fn run(
        &mut self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<PipelineReport, PipelineError> {
        let total = self.stages.len();
        self.report = PipelineReport::default();

        for (index, entry) in self.stages.iter().enumerate() {
            let name = entry.stage.name().to_string();
            self.state = PipelineState::Running(name.clone());
            ctx.observer.stage_started(index, total, &name);
            info!(stage = %name, "[{}/{}] Starting stage", index + 1, total);

            let start = Instant::now();
            let result = entry.stage.run(ctx, vm).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (record, error) = match result {
                Ok(stage_report) => {
                    for warning in &stage_report.warnings {
                        warn!(stage = %name, "{}", warning);
                    }
                    (
                        StageRecord {
                            name: name.clone(),
                            fatality: entry.fatality,
                            status: StageStatus::Succeeded,
                            warnings: stage_report.warnings,
                            notes: stage_report.notes,
                            validation: stage_report.validation,
                            duration_ms,
                        },
                        None,
                    )
                }
                Err(e) => {
                    let status = match entry.fatality {
                        Fatality::Fatal => StageStatus::Failed(e.to_string()),
                        Fatality::Recoverable => {
                            warn!(stage = %name, error = %e, "Stage failed, continuing");
                            StageStatus::Recovered(e.to_string())
                        }
                    };
                    let validation = match &e {
                        StageError::Validation(report) => Some(report.clone()),
                        _ => None,
                    };
                    (
                        StageRecord {
                            name: name.clone(),
                            fatality: entry.fatality,
                            status,
                            warnings: Vec::new(),
                            notes: Vec::new(),
                            validation,
                            duration_ms,
                        },
                        (entry.fatality == Fatality::Fatal).then_some(e),
                    )
                }
            };

            ctx.observer.stage_finished(&name, &record);
            self.report.stages.push(record);

            if let Some(source) = error {
                self.state = PipelineState::Aborted(name.clone());
                warn!(stage = %name, "Pipeline aborted");
                return Err(PipelineError::Aborted {
                    stage: name,
                    source,
                });
            }
        }

        self.state = PipelineState::Completed;
        Ok(self.report.clone())
    }
}
