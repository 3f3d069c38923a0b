//! vmflow-engine
//!
//! 使い捨てVMのデプロイパイプラインと、それを支える部品群。
//!
//! - [`executor`]: 複数の方法を順に試すハイパーバイザー操作
//! - [`poller`]: 間隔と回数で制限された完了待ち
//! - [`pipeline`] / [`stages`]: 順序付きステージの実行と標準ステージ
//! - [`validation`]: 設定時とデプロイ後の検証
//! - [`confirm`] / [`destroy`]: 確認付きのVM削除

pub mod confirm;
pub mod destroy;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod poller;
pub mod probes;
pub mod stages;
pub mod validation;

pub use confirm::{
    Authorization, ConfirmationGate, DESTROY_ALL_PHRASE, DestroyAuthorization, Prompt,
};
pub use destroy::{BulkReport, DestroyWorkflow, VmDestroyReport, find_matching, matches_pattern};
pub use error::{DestroyError, PipelineError, Result, StageError};
pub use executor::{
    ExecutionReport, Invocation, OperationOutcome, OperationStrategy, ResilientExecutor,
};
pub use pipeline::{
    Fatality, Pipeline, PipelineObserver, PipelineReport, PipelineStage, PipelineState,
    QuietObserver, Stage, StageContext, StageRecord, StageReport, StageStatus,
};
pub use poller::{
    PollEvent, PollObserver, PollOutcome, PollPolicy, PollResult, Probe, SilentObserver, poll,
    wait_fixed,
};
pub use probes::{CloudInitStatus, CloudInitStatusProbe, GuestIpProbe, SshReachableProbe};
pub use stages::{ArtifactStager, DeployOptions, WaitMode, standard_stages};
pub use validation::{DeploymentValidator, ValidationReport};
