//! テスト用の偽ハイパーバイザー・偽シェル

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use vmflow_core::{DeploymentConfig, HypervisorEndpoint, PollBounds};
use vmflow_engine::{ArtifactStager, Prompt, StageError};
use vmflow_hypervisor::{
    BootOrder, CommandOutput, CreateVmSpec, DatastorePath, Device, DeviceKind, DiskSelector,
    Hypervisor, HypervisorError, PowerState, RemoteShell, Result, VmSummary,
};

pub const GUEST_IP: &str = "10.0.0.5";
pub const GUEST_HOSTNAME: &str = "pentest-20250309-140507";

/// 呼び出しを記録する偽ハイパーバイザー
///
/// 呼び出しは `method(args)` 形式で記録され、`fail_on` で登録した
/// 文字列を含む呼び出しは失敗します。
#[derive(Default)]
pub struct FakeHypervisor {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    guest_ips: Mutex<VecDeque<Option<String>>>,
    devices: Mutex<Vec<Device>>,
    vms: Mutex<Vec<String>>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, pattern: &str) -> Self {
        self.failing.lock().unwrap().push(pattern.to_string());
        self
    }

    /// 順に返すIP（最後の値は繰り返す）
    pub fn with_guest_ips(self, ips: &[Option<&str>]) -> Self {
        *self.guest_ips.lock().unwrap() = ips.iter().map(|ip| ip.map(String::from)).collect();
        self
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        *self.devices.lock().unwrap() = devices;
        self
    }

    pub fn with_vms(self, vms: &[&str]) -> Self {
        *self.vms.lock().unwrap() = vms.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `method` で始まる呼び出しの数
    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    fn record(&self, call: String) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| call.contains(pattern.as_str()));
        self.calls.lock().unwrap().push(call.clone());
        if failing {
            Err(HypervisorError::command_failed(call, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

pub fn device(name: &str, kind: DeviceKind, attached_file: Option<&str>) -> Device {
    Device {
        name: name.to_string(),
        kind,
        summary: String::new(),
        attached_file: attached_file.map(String::from),
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()> {
        self.record(format!("create_vm({})", spec.name))?;
        self.vms.lock().unwrap().push(spec.name.clone());
        Ok(())
    }

    async fn power_on(&self, vm: &str) -> Result<()> {
        self.record(format!("power_on({vm})"))
    }

    async fn power_off(&self, vm: &str) -> Result<()> {
        self.record(format!("power_off({vm})"))
    }

    async fn list_devices(&self, vm: &str) -> Result<Vec<Device>> {
        self.record(format!("list_devices({vm})"))?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn device_info(&self, vm: &str, device: &str) -> Result<String> {
        self.record(format!("device_info({vm}, {device})"))?;
        Ok(String::new())
    }

    async fn add_cdrom(&self, vm: &str) -> Result<String> {
        self.record(format!("add_cdrom({vm})"))?;
        Ok("cdrom-3000".to_string())
    }

    async fn insert_media(&self, vm: &str, device: &str, iso: &DatastorePath) -> Result<()> {
        self.record(format!("insert_media({vm}, {device}, {iso})"))
    }

    async fn connect_device(&self, vm: &str, device: &str) -> Result<()> {
        self.record(format!("connect_device({vm}, {device})"))
    }

    async fn set_boot_order(&self, vm: &str, order: &BootOrder) -> Result<()> {
        self.record(format!("set_boot_order({vm}, {order})"))
    }

    async fn resize_disk(&self, vm: &str, disk: &DiskSelector, size_gb: u32) -> Result<()> {
        self.record(format!("resize_disk({vm}, {disk}, {size_gb})"))
    }

    async fn upload_to_datastore(
        &self,
        local: &Path,
        datastore: &str,
        remote: &str,
    ) -> Result<DatastorePath> {
        self.record(format!("upload_to_datastore({}, {remote})", local.display()))?;
        Ok(DatastorePath::new(datastore, remote))
    }

    async fn guest_ip(&self, vm: &str) -> Result<Option<String>> {
        self.record(format!("guest_ip({vm})"))?;
        let mut ips = self.guest_ips.lock().unwrap();
        if ips.len() > 1 {
            Ok(ips.pop_front().flatten())
        } else {
            Ok(ips.front().cloned().flatten())
        }
    }

    async fn list_vms(&self) -> Result<Vec<String>> {
        self.record("list_vms()".to_string())?;
        Ok(self.vms.lock().unwrap().clone())
    }

    async fn vm_summary(&self, vm: &str) -> Result<VmSummary> {
        self.record(format!("vm_summary({vm})"))?;
        Ok(VmSummary {
            name: vm.to_string(),
            power_state: PowerState::On,
            ip: None,
            cpus: Some(8),
            memory_mb: Some(8192),
            hostname: None,
        })
    }

    async fn vm_info_text(&self, vm: &str) -> Result<String> {
        self.record(format!("vm_info_text({vm})"))?;
        Ok(format!("Name: {vm}"))
    }

    async fn snapshot_tree(&self, vm: &str) -> Result<String> {
        self.record(format!("snapshot_tree({vm})"))?;
        Ok(String::new())
    }

    async fn remove_snapshots(&self, vm: &str) -> Result<()> {
        self.record(format!("remove_snapshots({vm})"))
    }

    async fn destroy_vm(&self, vm: &str) -> Result<()> {
        self.record(format!("destroy_vm({vm})"))?;
        self.vms.lock().unwrap().retain(|v| v != vm);
        Ok(())
    }
}

/// コマンドごとに応答を返す偽シェル
///
/// 応答は登録順に返し、最後の応答は繰り返します。
/// 未登録のコマンドは空の成功を返します。
#[derive(Default)]
pub struct FakeShell {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    commands: Mutex<Vec<String>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, command: &str, outputs: Vec<CommandOutput>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), outputs.into());
        self
    }

    /// 正常に構築済みのゲスト
    pub fn healthy_guest() -> Self {
        Self::new()
            .respond("echo ready", vec![CommandOutput::ok("ready")])
            .respond("echo \"SSH OK\"", vec![CommandOutput::ok("SSH OK")])
            .respond(
                "cloud-init status --long",
                vec![CommandOutput::ok("status: done\n")],
            )
            .respond(
                "sudo cloud-init schema --system",
                vec![CommandOutput::ok("Valid schema user-data")],
            )
            .respond(
                "docker --version && systemctl is-active docker",
                vec![CommandOutput::ok("Docker version 27.5.1, build 9f9e405\nactive")],
            )
            .respond(
                "/usr/local/go/bin/go version",
                vec![CommandOutput::ok("go version go1.24.4 linux/amd64")],
            )
            .respond("hostname", vec![CommandOutput::ok(GUEST_HOSTNAME)])
            .respond(
                "ip -4 addr show | grep inet",
                vec![CommandOutput::ok(
                    "    inet 127.0.0.1/8 scope host lo\n    inet 10.0.0.5/24 scope global ens160",
                )],
            )
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(&self, _target: &str, command: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        let mut responses = self.responses.lock().unwrap();
        let output = match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// ツール確認とISO作成を模擬する
#[derive(Default)]
pub struct FakeStager {
    pub missing: Vec<String>,
}

#[async_trait]
impl ArtifactStager for FakeStager {
    async fn missing_tools(&self, _config: &DeploymentConfig) -> Vec<String> {
        self.missing.clone()
    }

    async fn ensure_image(
        &self,
        _config: &DeploymentConfig,
    ) -> std::result::Result<(), StageError> {
        Ok(())
    }

    async fn build_iso(
        &self,
        _source_dir: &Path,
        iso: &Path,
    ) -> std::result::Result<(), StageError> {
        tokio::fs::write(iso, b"iso").await?;
        Ok(())
    }
}

/// 決められた回答を返すプロンプト
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    pub questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> usize {
        self.questions.lock().unwrap().len()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, question: &str) -> io::Result<String> {
        self.questions.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more answers"))
    }
}

/// テスト用の設定（待機時間は短め）
pub fn test_config(tools_dir: &Path) -> DeploymentConfig {
    let endpoint = HypervisorEndpoint::new("esxi.test", "root", "secret");
    let mut config = DeploymentConfig::with_defaults(endpoint, tools_dir);
    config.timings.guest_ip = PollBounds::new(Duration::from_secs(10), 60);
    config.timings.ssh_reachable = PollBounds::new(Duration::from_secs(10), 3);
    config.timings.first_boot = PollBounds::new(Duration::from_secs(30), 5);
    config.timings.fixed_wait = Duration::from_secs(120);
    config.timings.fixed_wait_step = Duration::from_secs(60);
    config.timings.destroy_settle = Duration::from_secs(3);
    config
}
