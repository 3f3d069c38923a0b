//! govc CLI wrapper
//!
//! Wraps the govc commands used for ESXi VM management. Credentials are
//! passed to the child process environment only.

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use vmflow_core::HypervisorEndpoint;
use vmflow_hypervisor::{Device, DeviceKind, HypervisorError, PowerState, Result, VmSummary};

/// govc CLI wrapper
pub struct Govc {
    bin: PathBuf,
    endpoint: HypervisorEndpoint,
}

impl Govc {
    pub fn new(bin: impl Into<PathBuf>, endpoint: HypervisorEndpoint) -> Self {
        Self {
            bin: bin.into(),
            endpoint,
        }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Run a govc verb and return stdout
    pub async fn run_command(&self, verb: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg(verb);
        cmd.args(args);
        cmd.env("GOVC_URL", self.endpoint.sdk_url());
        cmd.env("GOVC_USERNAME", &self.endpoint.user);
        cmd.env("GOVC_PASSWORD", &self.endpoint.password);
        cmd.env("GOVC_INSECURE", "1");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: govc {} {}", verb, args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                HypervisorError::ToolNotFound(self.bin.display().to_string())
            }
            _ => HypervisorError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HypervisorError::command_failed(
                verb,
                stderr.trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn list_devices(&self, vm: &str) -> Result<Vec<Device>> {
        let output = self.run_command("device.ls", &["-vm", vm]).await?;
        Ok(parse_device_list(&output))
    }

    pub async fn vm_summary(&self, vm: &str) -> Result<VmSummary> {
        let output = self.run_command("vm.info", &["-json", vm]).await?;
        parse_vm_info_json(&output)?
            .into_iter()
            .next()
            .ok_or_else(|| HypervisorError::Parse {
                verb: "vm.info".to_string(),
                message: format!("no virtual machine named {vm}"),
            })
    }

    pub async fn list_vms(&self) -> Result<Vec<String>> {
        let output = self.run_command("ls", &["/*/vm/"]).await?;
        Ok(parse_vm_list(&output))
    }
}

/// Parse `govc device.ls` output
///
/// Each line is `<name> <type> <summary...>`, e.g.
/// `cdrom-3000  VirtualCdrom  ISO [datastore1] iso/seed.iso`.
pub fn parse_device_list(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let mut parts = line.splitn(2, char::is_whitespace);
            let name = parts.next()?.trim();
            let rest = parts.next().unwrap_or("").trim_start();
            if name.is_empty() {
                return None;
            }

            let mut parts = rest.splitn(2, char::is_whitespace);
            let type_name = parts.next().unwrap_or("");
            let summary = parts.next().unwrap_or("").trim().to_string();

            Some(Device {
                name: name.to_string(),
                kind: device_kind(name, type_name),
                attached_file: attached_file(&summary),
                summary,
            })
        })
        .collect()
}

fn device_kind(name: &str, type_name: &str) -> DeviceKind {
    match DeviceKind::from_type_name(type_name) {
        DeviceKind::Other => DeviceKind::from_type_name(name),
        kind => kind,
    }
}

/// Extract a `[datastore] path` reference from a device summary
fn attached_file(summary: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]+\]\s*\S.*").ok())
        .as_ref()?
        .find(summary)
        .map(|m| m.as_str().trim().to_string())
}

#[derive(Debug, Deserialize)]
struct VmInfoResponse {
    #[serde(rename = "VirtualMachines", alias = "virtualMachines", default)]
    virtual_machines: Option<Vec<VmInfo>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmInfo {
    #[serde(rename = "Name", alias = "name")]
    name: Option<String>,
    #[serde(rename = "Config", alias = "config")]
    config: Option<VmConfigInfo>,
    #[serde(rename = "Guest", alias = "guest")]
    guest: Option<GuestInfo>,
    #[serde(rename = "Runtime", alias = "runtime")]
    runtime: Option<RuntimeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmConfigInfo {
    #[serde(rename = "Name", alias = "name")]
    name: Option<String>,
    #[serde(rename = "Hardware", alias = "hardware")]
    hardware: Option<HardwareInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HardwareInfo {
    #[serde(rename = "NumCPU", alias = "numCPU")]
    num_cpu: Option<u32>,
    #[serde(rename = "MemoryMB", alias = "memoryMB")]
    memory_mb: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GuestInfo {
    #[serde(rename = "IpAddress", alias = "ipAddress")]
    ip_address: Option<String>,
    #[serde(rename = "HostName", alias = "hostName")]
    host_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuntimeInfo {
    #[serde(rename = "PowerState", alias = "powerState")]
    power_state: Option<String>,
}

/// Parse `govc vm.info -json` output
///
/// Accepts both the PascalCase and camelCase field styles that different
/// govc releases emit.
pub fn parse_vm_info_json(output: &str) -> Result<Vec<VmSummary>> {
    let response: VmInfoResponse = serde_json::from_str(output)?;

    Ok(response
        .virtual_machines
        .unwrap_or_default()
        .into_iter()
        .map(|vm| {
            let hardware = vm.config.as_ref().and_then(|c| c.hardware.as_ref());
            VmSummary {
                name: vm
                    .name
                    .clone()
                    .or_else(|| vm.config.as_ref().and_then(|c| c.name.clone()))
                    .unwrap_or_default(),
                power_state: vm
                    .runtime
                    .as_ref()
                    .and_then(|r| r.power_state.as_deref())
                    .map(PowerState::parse)
                    .unwrap_or(PowerState::Unknown),
                ip: vm
                    .guest
                    .as_ref()
                    .and_then(|g| g.ip_address.clone())
                    .filter(|ip| !ip.is_empty()),
                cpus: hardware.and_then(|h| h.num_cpu),
                memory_mb: hardware.and_then(|h| h.memory_mb),
                hostname: vm
                    .guest
                    .as_ref()
                    .and_then(|g| g.host_name.clone())
                    .filter(|h| !h.is_empty()),
            }
        })
        .collect())
}

/// Parse `govc ls /*/vm/` output into VM names
pub fn parse_vm_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.trim_end_matches('/').rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
