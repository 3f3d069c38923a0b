//! デプロイ後の検証（稼働中のゲストに対して実行）

use super::{EXPECTED_COMPONENTS, ValidationReport};
use crate::probes::{CLOUD_INIT_STATUS_COMMAND, CloudInitStatus};
use tracing::{debug, info};
use vmflow_core::naming;
use vmflow_hypervisor::{CommandOutput, RemoteShell};

const SCHEMA_COMMAND: &str = "sudo cloud-init schema --system";
const NETWORK_COMMAND: &str = "ip -4 addr show | grep inet";

/// ゲスト検証
pub struct DeploymentValidator<'a> {
    shell: &'a dyn RemoteShell,
    target: String,
    hostname_prefix: String,
}

impl<'a> DeploymentValidator<'a> {
    /// `target` は `user@ip` 形式
    pub fn new(
        shell: &'a dyn RemoteShell,
        target: impl Into<String>,
        hostname_prefix: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            target: target.into(),
            hostname_prefix: hostname_prefix.into(),
        }
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, String> {
        self.shell
            .run(&self.target, command)
            .await
            .map_err(|e| e.to_string())
    }

    /// 全項目を検証する
    pub async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        info!(target = %self.target, "Validating deployed guest");

        if !self.check_ssh(&mut report).await {
            report.add_info("Skipped guest checks: SSH connection unavailable");
            return report;
        }

        let cloud_init_available = self.check_cloud_init_status(&mut report).await;
        if cloud_init_available {
            self.check_schema(&mut report).await;
        } else {
            report.add_info("Skipped schema check: cloud-init not available");
        }
        self.check_components(&mut report).await;
        self.check_hostname(&mut report).await;
        self.check_network(&mut report).await;

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Guest validation finished"
        );
        report
    }

    async fn check_ssh(&self, report: &mut ValidationReport) -> bool {
        match self.run("echo \"SSH OK\"").await {
            Ok(output) if output.success() => {
                report.add_info("SSH connection successful");
                true
            }
            Ok(output) => {
                report.add_error(format!(
                    "SSH connection failed: {}",
                    output.stderr.trim()
                ));
                false
            }
            Err(e) => {
                report.add_error(format!("SSH connection error: {e}"));
                false
            }
        }
    }

    /// cloud-init が利用可能なら true
    async fn check_cloud_init_status(&self, report: &mut ValidationReport) -> bool {
        let output = match self.run(CLOUD_INIT_STATUS_COMMAND).await {
            Ok(output) => output,
            Err(e) => {
                report.add_error(format!("Could not check cloud-init status: {e}"));
                return true;
            }
        };

        match CloudInitStatus::parse(&output) {
            CloudInitStatus::Done => report.add_info("Cloud-init completed successfully"),
            CloudInitStatus::Running => report.add_warning("Cloud-init is still running"),
            CloudInitStatus::NotStarted => {
                report.add_error("Cloud-init has not started; likely configuration error")
            }
            CloudInitStatus::Error { detail } => report.add_error(match detail {
                Some(detail) => format!("Cloud-init completed with errors: {detail}"),
                None => "Cloud-init completed with errors".to_string(),
            }),
            CloudInitStatus::NotAvailable => {
                report.add_warning(
                    "cloud-init is not available on the guest; convergence could not be confirmed",
                );
                return false;
            }
            CloudInitStatus::Unknown(status) => {
                report.add_warning(format!("Unknown cloud-init status: {status}"))
            }
        }
        true
    }

    async fn check_schema(&self, report: &mut ValidationReport) {
        match self.run(SCHEMA_COMMAND).await {
            Ok(output) if output.success() => {
                report.add_info("Cloud-init schema validation passed")
            }
            Ok(output) => {
                let text = output.combined();
                if text.contains("datasource_list") {
                    report.add_error(
                        "Schema validation failed: datasource_list not allowed in user-data",
                    );
                } else {
                    let first = text.lines().map(str::trim).find(|l| !l.is_empty());
                    report.add_error(format!(
                        "Schema validation failed: {}",
                        first.unwrap_or("no output")
                    ));
                }
            }
            Err(e) => report.add_error(format!("Error checking schema compliance: {e}")),
        }
    }

    async fn check_components(&self, report: &mut ValidationReport) {
        for component in EXPECTED_COMPONENTS {
            match self.run(component.check_command).await {
                Ok(output) if output.success() => {
                    let version = output.stdout.lines().next().unwrap_or("").trim();
                    report.add_info(format!("{} is installed: {version}", component.name));
                }
                Ok(_) => report.add_error(format!(
                    "{} is not properly installed or running",
                    component.name
                )),
                Err(e) => report.add_error(format!("Error checking {}: {e}", component.name)),
            }
        }
    }

    async fn check_hostname(&self, report: &mut ValidationReport) {
        match self.run("hostname").await {
            Ok(output) if output.success() => {
                let hostname = output.stdout.trim();
                if naming::hostname_matches(&self.hostname_prefix, hostname) {
                    report.add_info(format!("Hostname set correctly: {hostname}"));
                } else {
                    report.add_warning(format!("Unexpected hostname: {hostname}"));
                }
            }
            _ => report.add_warning("Could not check hostname"),
        }
    }

    async fn check_network(&self, report: &mut ValidationReport) {
        match self.run(NETWORK_COMMAND).await {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                let count = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
                report.add_info(format!("Network interfaces configured ({count} addresses)"));
            }
            _ => report.add_warning("Could not check network interfaces"),
        }
    }
}
