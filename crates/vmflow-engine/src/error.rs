use crate::validation::ValidationReport;
use thiserror::Error;
use vmflow_core::CoreError;
use vmflow_hypervisor::HypervisorError;

/// ステージ実行エラー
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("検証エラー: {} 件のエラーがあります", .0.errors.len())]
    Validation(ValidationReport),

    #[error("必要なツールが見つかりません: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("{operation} のすべての方法が失敗しました: {last_error}")]
    StrategiesExhausted {
        operation: String,
        last_error: String,
    },

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("成果物の準備に失敗しました: {0}")]
    Artifact(String),

    #[error("ファイル操作エラー: {0}")]
    Io(#[from] std::io::Error),
}

/// パイプラインエラー
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("ステージ '{stage}' で中断しました: {source}")]
    Aborted {
        stage: String,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::Aborted { stage, .. } => stage,
        }
    }
}

/// VM削除エラー
#[derive(Error, Debug)]
pub enum DestroyError {
    #[error("VM '{vm}' の削除に失敗しました: {source}")]
    DestroyFailed {
        vm: String,
        #[source]
        source: HypervisorError,
    },

    #[error("VM一覧を取得できません: {0}")]
    Listing(#[source] HypervisorError),

    #[error("無効なパターンです: {0}")]
    InvalidPattern(String),
}

pub type Result<T> = std::result::Result<T, StageError>;
