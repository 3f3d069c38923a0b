//! ovftool CLI wrapper

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use vmflow_core::HypervisorEndpoint;
use vmflow_hypervisor::{CreateVmSpec, HypervisorError, Result};

/// ovftool CLI wrapper used to import images as new VMs
pub struct Ovftool {
    bin: PathBuf,
    endpoint: HypervisorEndpoint,
}

impl Ovftool {
    pub fn new(bin: impl Into<PathBuf>, endpoint: HypervisorEndpoint) -> Self {
        Self {
            bin: bin.into(),
            endpoint,
        }
    }

    /// `vi://user:password@host/` target locator with percent-encoded credentials
    pub fn locator(&self) -> String {
        format!(
            "vi://{}:{}@{}/",
            urlencoding::encode(&self.endpoint.user),
            urlencoding::encode(&self.endpoint.password),
            self.endpoint.host
        )
    }

    fn redacted_locator(&self) -> String {
        format!(
            "vi://{}:****@{}/",
            urlencoding::encode(&self.endpoint.user),
            self.endpoint.host
        )
    }

    /// Arguments for an import, without the target locator
    pub fn import_args(spec: &CreateVmSpec) -> Vec<String> {
        vec![
            "--acceptAllEulas".to_string(),
            "--allowExtraConfig".to_string(),
            "--diskMode=thin".to_string(),
            format!("--datastore={}", spec.datastore),
            format!("--numberOfCpus:*={}", spec.cpus),
            format!("--memorySize:*={}", spec.memory_mb),
            format!("--name={}", spec.name),
            format!("--net:{}={}", spec.network, spec.network),
            spec.image.display().to_string(),
        ]
    }

    /// Import the image described by `spec`
    pub async fn import(&self, spec: &CreateVmSpec) -> Result<()> {
        let args = Self::import_args(spec);

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args);
        cmd.arg(self.locator());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: ovftool {} {}", args.join(" "), self.redacted_locator());

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                HypervisorError::ToolNotFound(self.bin.display().to_string())
            }
            _ => HypervisorError::Io(e),
        })?;

        if !output.status.success() {
            // ovftool reports most failures on stdout
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                last_error_line(&stdout)
            } else {
                stderr.trim().to_string()
            };
            return Err(HypervisorError::command_failed(
                "ovftool",
                message.replace(&self.endpoint.password, "****"),
            ));
        }

        Ok(())
    }
}

fn last_error_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|line| line.contains("Error"))
        .or_else(|| output.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("")
        .trim()
        .to_string()
}
