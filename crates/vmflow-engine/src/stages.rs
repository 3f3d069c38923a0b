//! 標準デプロイステージ

use crate::error::StageError;
use crate::executor::{
    ResilientExecutor, boot_order_strategies, connect_strategies, disk_resize_strategies,
};
use crate::pipeline::{ForwardPollEvents, PipelineStage, Stage, StageContext, StageReport};
use crate::poller::{PollOutcome, PollPolicy, poll, wait_fixed};
use crate::probes::{CloudInitStatusProbe, GuestIpProbe, SshReachableProbe};
use crate::validation::{DeploymentValidator, validate_config};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};
use vmflow_core::{CloudInitDocument, DeploymentConfig, USER_DATA_TEMPLATE, VmIdentity};
use vmflow_hypervisor::CreateVmSpec;

pub const PREFLIGHT_VALIDATION: &str = "preflight-validation";
pub const CHECK_DEPENDENCIES: &str = "check-dependencies";
pub const PREPARE_DIRECTORIES: &str = "prepare-directories";
pub const STAGE_ARTIFACTS: &str = "stage-artifacts";
pub const CREATE_VM: &str = "create-vm";
pub const RESIZE_DISK: &str = "resize-disk";
pub const ATTACH_CONFIG_ISO: &str = "attach-config-iso";
pub const SET_BOOT_ORDER: &str = "set-boot-order";
pub const POWER_ON: &str = "power-on";
pub const WAIT_FOR_COMPLETION: &str = "wait-for-completion";
pub const REPORT_STATUS: &str = "report-status";

/// 起動完了の待ち方
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitMode {
    /// SSHで確認し、疎通できなければ固定待機
    #[default]
    Auto,
    /// SSHでのみ確認
    Ssh,
    /// 固定時間待機
    Fixed,
    /// 待機しない
    Skip,
}

impl FromStr for WaitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(WaitMode::Auto),
            "ssh" => Ok(WaitMode::Ssh),
            "fixed" => Ok(WaitMode::Fixed),
            "skip" => Ok(WaitMode::Skip),
            other => Err(format!(
                "unknown wait mode '{other}' (expected auto, ssh, fixed or skip)"
            )),
        }
    }
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitMode::Auto => write!(f, "auto"),
            WaitMode::Ssh => write!(f, "ssh"),
            WaitMode::Fixed => write!(f, "fixed"),
            WaitMode::Skip => write!(f, "skip"),
        }
    }
}

/// デプロイオプション
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub wait_mode: WaitMode,
    /// user-data テンプレート（未指定なら組み込みテンプレート）
    pub template: Option<String>,
}

impl DeployOptions {
    pub fn template(&self) -> &str {
        self.template.as_deref().unwrap_or(USER_DATA_TEMPLATE)
    }
}

/// ローカル側の成果物準備
///
/// ツールの存在確認・イメージ取得・ISO作成はこのトレイト越しに行います。
#[async_trait]
pub trait ArtifactStager: Send + Sync {
    /// 見つからないツールの一覧
    async fn missing_tools(&self, config: &DeploymentConfig) -> Vec<String>;

    /// クラウドイメージを `config.paths.image_path()` に用意する
    async fn ensure_image(&self, config: &DeploymentConfig) -> Result<(), StageError>;

    /// `source_dir` の user-data / meta-data / network-config から ISO を作る
    async fn build_iso(&self, source_dir: &Path, iso: &Path) -> Result<(), StageError>;
}

/// 標準のステージ列
pub fn standard_stages() -> Vec<PipelineStage> {
    vec![
        PipelineStage::fatal(PreflightValidation),
        PipelineStage::fatal(CheckDependencies),
        PipelineStage::fatal(PrepareDirectories),
        PipelineStage::fatal(StageArtifacts),
        PipelineStage::fatal(CreateVm),
        PipelineStage::recoverable(ResizeDisk),
        PipelineStage::fatal(AttachConfigIso),
        PipelineStage::recoverable(SetBootOrder),
        PipelineStage::fatal(PowerOn),
        PipelineStage::recoverable(WaitForCompletion),
        PipelineStage::recoverable(ReportStatus),
    ]
}

/// 設定時の検証
pub struct PreflightValidation;

#[async_trait]
impl Stage for PreflightValidation {
    fn name(&self) -> &str {
        PREFLIGHT_VALIDATION
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let template = ctx.options.template();
        let document = CloudInitDocument::render_with(template, ctx.config, vm, None)?;
        let validation = validate_config(template, &document.user_data);

        if !validation.passed() {
            return Err(StageError::Validation(validation));
        }

        let mut report = StageReport::new();
        report.warnings.extend(validation.warnings.iter().cloned());
        report.validation = Some(validation);
        Ok(report)
    }
}

/// 外部ツールの確認
pub struct CheckDependencies;

#[async_trait]
impl Stage for CheckDependencies {
    fn name(&self) -> &str {
        CHECK_DEPENDENCIES
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        _vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let missing = ctx.stager.missing_tools(ctx.config).await;
        if !missing.is_empty() {
            return Err(StageError::MissingTools(missing));
        }
        Ok(StageReport::new())
    }
}

/// 作業ディレクトリの作成
pub struct PrepareDirectories;

#[async_trait]
impl Stage for PrepareDirectories {
    fn name(&self) -> &str {
        PREPARE_DIRECTORIES
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        _vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        for dir in ctx.config.paths.all() {
            tokio::fs::create_dir_all(dir).await?;
            report.note(format!("Created: {}", dir.display()));
        }
        Ok(report)
    }
}

/// イメージ取得と cloud-init ISO の作成
pub struct StageArtifacts;

#[async_trait]
impl Stage for StageArtifacts {
    fn name(&self) -> &str {
        STAGE_ARTIFACTS
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let config = ctx.config;

        ctx.stager.ensure_image(config).await?;

        let ssh_key = match &config.guest.ssh_key_path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(key) => Some(key),
                Err(e) => {
                    report.warn(format!(
                        "Could not read SSH key {}: {e}; password login only",
                        path.display()
                    ));
                    None
                }
            },
            None => {
                report.warn("No SSH key found; password login only");
                None
            }
        };

        let document = CloudInitDocument::render_with(
            ctx.options.template(),
            config,
            vm,
            ssh_key.as_deref(),
        )?;

        let source_dir = config.paths.cloud_init_dir(&vm.name);
        tokio::fs::create_dir_all(&source_dir).await?;
        tokio::fs::write(source_dir.join("user-data"), &document.user_data).await?;
        tokio::fs::write(source_dir.join("meta-data"), &document.meta_data).await?;
        tokio::fs::write(source_dir.join("network-config"), &document.network_config).await?;

        let iso = config.paths.iso_path(&vm.name);
        ctx.stager.build_iso(&source_dir, &iso).await?;
        report.note(format!("Cloud-init ISO created: {}", iso.display()));
        Ok(report)
    }
}

/// VMのインポート
pub struct CreateVm;

#[async_trait]
impl Stage for CreateVm {
    fn name(&self) -> &str {
        CREATE_VM
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let config = ctx.config;
        let spec = CreateVmSpec {
            name: vm.name.clone(),
            image: config.paths.image_path(&config.image),
            datastore: config.datastore.clone(),
            network: config.network.clone(),
            cpus: config.sizing.cpus,
            memory_mb: config.sizing.memory_mb,
        };
        ctx.hypervisor.create_vm(&spec).await?;

        let mut report = StageReport::new();
        report.note(format!("VM created: {}", vm.name));
        Ok(report)
    }
}

/// ディスク拡張
pub struct ResizeDisk;

#[async_trait]
impl Stage for ResizeDisk {
    fn name(&self) -> &str {
        RESIZE_DISK
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();

        let devices = match ctx.hypervisor.list_devices(&vm.name).await {
            Ok(devices) => devices,
            Err(e) => {
                report.warn(format!("Could not list devices for disk discovery: {e}"));
                Vec::new()
            }
        };

        let size_gb = ctx.config.sizing.disk_gb;
        let strategies = disk_resize_strategies(size_gb, &devices);
        let execution = ResilientExecutor::new(ctx.hypervisor)
            .execute(RESIZE_DISK, &vm.name, &strategies)
            .await;

        if !execution.success {
            return Err(StageError::StrategiesExhausted {
                operation: RESIZE_DISK.to_string(),
                last_error: execution.last_error().unwrap_or_default().to_string(),
            });
        }

        for failure in execution.failures() {
            report.warn(format!(
                "{} failed: {}",
                failure.strategy_id,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        if let Some(strategy) = execution.succeeded_with() {
            report.note(format!("Disk resized to {size_gb}GB via {strategy}"));
        }
        Ok(report)
    }
}

/// cloud-init ISO のアップロードと接続
pub struct AttachConfigIso;

#[async_trait]
impl Stage for AttachConfigIso {
    fn name(&self) -> &str {
        ATTACH_CONFIG_ISO
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let config = ctx.config;
        let hypervisor = ctx.hypervisor;

        let local = config.paths.iso_path(&vm.name);
        let remote = format!("{}/cloud-init.iso", vm.name);
        let uploaded = hypervisor
            .upload_to_datastore(&local, &config.datastore, &remote)
            .await?;
        report.note(format!("Uploaded {uploaded}"));

        let added = hypervisor.add_cdrom(&vm.name).await?;
        hypervisor.insert_media(&vm.name, &added, &uploaded).await?;

        // ISO が実際に挿入されたドライブを探す
        let cdrom = match hypervisor.list_devices(&vm.name).await {
            Ok(devices) => devices
                .into_iter()
                .find(|d| {
                    d.is_cdrom()
                        && d
                            .attached_file
                            .as_deref()
                            .is_some_and(|f| f.ends_with(&uploaded.path))
                })
                .map(|d| d.name)
                .unwrap_or(added),
            Err(e) => {
                report.warn(format!("Could not list devices: {e}"));
                added
            }
        };

        let execution = ResilientExecutor::new(hypervisor)
            .execute("connect-cdrom", &vm.name, &connect_strategies(&cdrom))
            .await;
        if execution.success {
            report.note(format!("CD-ROM device {cdrom} connected"));
        } else {
            report.warn(format!(
                "CD-ROM {cdrom} could not be connected: {}; it connects at power-on",
                execution.last_error().unwrap_or("unknown error")
            ));
        }
        Ok(report)
    }
}

/// ブート順の設定
pub struct SetBootOrder;

#[async_trait]
impl Stage for SetBootOrder {
    fn name(&self) -> &str {
        SET_BOOT_ORDER
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let execution = ResilientExecutor::new(ctx.hypervisor)
            .execute(SET_BOOT_ORDER, &vm.name, &boot_order_strategies())
            .await;

        if !execution.success {
            return Err(StageError::StrategiesExhausted {
                operation: SET_BOOT_ORDER.to_string(),
                last_error: execution.last_error().unwrap_or_default().to_string(),
            });
        }

        let mut report = StageReport::new();
        for failure in execution.failures() {
            report.warn(format!(
                "{} failed: {}",
                failure.strategy_id,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        Ok(report)
    }
}

/// 電源オン
pub struct PowerOn;

#[async_trait]
impl Stage for PowerOn {
    fn name(&self) -> &str {
        POWER_ON
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        ctx.hypervisor.power_on(&vm.name).await?;
        Ok(StageReport::new())
    }
}

/// IPアドレス取得と起動完了待ち
pub struct WaitForCompletion;

impl WaitForCompletion {
    async fn fixed_wait(ctx: &StageContext<'_>, report: &mut StageReport) {
        let timings = &ctx.config.timings;
        let mut observer = ForwardPollEvents(ctx.observer);
        wait_fixed(timings.fixed_wait, timings.fixed_wait_step, &mut observer).await;
        report.note(format!(
            "Waited {}s for first boot without verification",
            timings.fixed_wait.as_secs()
        ));
    }
}

#[async_trait]
impl Stage for WaitForCompletion {
    fn name(&self) -> &str {
        WAIT_FOR_COMPLETION
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let timings = &ctx.config.timings;
        let mode = ctx.options.wait_mode;
        let mut observer = ForwardPollEvents(ctx.observer);

        let mut ip_probe = GuestIpProbe::new(ctx.hypervisor, &vm.name);
        match poll(&mut ip_probe, &PollPolicy::from(&timings.guest_ip), &mut observer).await {
            PollOutcome::Ready { value, .. } => {
                info!(vm = %vm.name, ip = %value, "Guest IP assigned");
                vm.record_ip(value);
            }
            PollOutcome::Failed { reason, .. } => {
                report.warn(format!("Could not query guest IP: {reason}"));
            }
            PollOutcome::TimedOut { elapsed, .. } => {
                report.warn(format!(
                    "No IP address observed after {}s; check the VM console",
                    elapsed.as_secs()
                ));
            }
        }

        if mode == WaitMode::Skip {
            report.note("Completion wait skipped");
            return Ok(report);
        }
        if mode == WaitMode::Fixed {
            Self::fixed_wait(ctx, &mut report).await;
            return Ok(report);
        }

        let user = &ctx.config.guest.user;
        let Some(target) = vm.ssh_target(user) else {
            if mode == WaitMode::Ssh {
                return Err(StageError::Timeout(
                    "no guest IP, SSH readiness check impossible".to_string(),
                ));
            }
            warn!(vm = %vm.name, "No IP address, falling back to fixed wait");
            Self::fixed_wait(ctx, &mut report).await;
            return Ok(report);
        };

        let mut ssh_probe = SshReachableProbe::new(ctx.shell, target.clone());
        let reachable = poll(
            &mut ssh_probe,
            &PollPolicy::from(&timings.ssh_reachable),
            &mut observer,
        )
        .await;
        if !reachable.is_ready() {
            if mode == WaitMode::Ssh {
                return Err(StageError::Timeout(format!(
                    "SSH to {target} not reachable"
                )));
            }
            report.warn(format!(
                "SSH to {target} not reachable; falling back to fixed wait"
            ));
            Self::fixed_wait(ctx, &mut report).await;
            return Ok(report);
        }

        let mut status_probe = CloudInitStatusProbe::new(ctx.shell, target.clone());
        let policy =
            PollPolicy::from(&timings.first_boot).with_settle(timings.first_boot_settle);
        match poll(&mut status_probe, &policy, &mut observer).await {
            PollOutcome::Ready { elapsed, .. } => {
                report.note(format!(
                    "Cloud-init completed after {}s",
                    elapsed.as_secs()
                ));
            }
            PollOutcome::Failed { reason, .. } => {
                report.warn(format!("Cloud-init did not complete cleanly: {reason}"));
            }
            PollOutcome::TimedOut { elapsed, .. } => {
                report.warn(format!(
                    "Cloud-init still running after {}s; check manually: ssh {target} cloud-init status --long",
                    elapsed.as_secs()
                ));
                report.warn("Skipped deploy validation: guest has not converged");
                return Ok(report);
            }
        }

        let validation =
            DeploymentValidator::new(ctx.shell, target, &ctx.config.naming.hostname_prefix)
                .validate()
                .await;
        report.validation = Some(validation);
        Ok(report)
    }
}

/// 結果の表示
pub struct ReportStatus;

#[async_trait]
impl Stage for ReportStatus {
    fn name(&self) -> &str {
        REPORT_STATUS
    }

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        vm: &mut VmIdentity,
    ) -> Result<StageReport, StageError> {
        let mut report = StageReport::new();
        let ip = vm.ip.as_deref().unwrap_or("unknown");
        info!(vm = %vm.name, hostname = %vm.hostname, ip = %ip, "Deployment finished");

        report.note(format!("VM name: {}", vm.name));
        report.note(format!("Hostname: {}", vm.hostname));
        report.note(format!("IP address: {ip}"));
        if let Some(target) = vm.ssh_target(&ctx.config.guest.user) {
            report.note(format!("Login: ssh {target}"));
        }
        Ok(report)
    }
}
