//! ゲストの状態を問い合わせるプローブ

use crate::poller::{PollResult, Probe};
use async_trait::async_trait;
use tracing::debug;
use vmflow_hypervisor::{CommandOutput, Hypervisor, HypervisorError, RemoteShell};

/// IPアドレス未割り当てを表す値
pub const UNASSIGNED_IP: &str = "0.0.0.0";

/// cloud-init の状態確認コマンド
pub const CLOUD_INIT_STATUS_COMMAND: &str = "cloud-init status --long";

/// ゲストのIPアドレス取得
pub struct GuestIpProbe<'a> {
    hypervisor: &'a dyn Hypervisor,
    vm: &'a str,
}

impl<'a> GuestIpProbe<'a> {
    pub fn new(hypervisor: &'a dyn Hypervisor, vm: &'a str) -> Self {
        Self { hypervisor, vm }
    }
}

#[async_trait]
impl Probe for GuestIpProbe<'_> {
    type Output = String;

    fn name(&self) -> &str {
        "guest-ip"
    }

    async fn check(&mut self) -> PollResult<String> {
        match self.hypervisor.guest_ip(self.vm).await {
            Ok(Some(ip)) if !ip.trim().is_empty() && ip.trim() != UNASSIGNED_IP => {
                PollResult::Ready(ip.trim().to_string())
            }
            Ok(_) => PollResult::Pending,
            Err(HypervisorError::ToolNotFound(tool)) => {
                PollResult::Failed(format!("tool not found: {tool}"))
            }
            Err(e) => {
                debug!(vm = self.vm, error = %e, "Guest IP query failed, retrying");
                PollResult::Pending
            }
        }
    }
}

/// SSH疎通確認
pub struct SshReachableProbe<'a> {
    shell: &'a dyn RemoteShell,
    target: String,
}

impl<'a> SshReachableProbe<'a> {
    pub fn new(shell: &'a dyn RemoteShell, target: impl Into<String>) -> Self {
        Self {
            shell,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Probe for SshReachableProbe<'_> {
    type Output = ();

    fn name(&self) -> &str {
        "ssh"
    }

    async fn check(&mut self) -> PollResult<()> {
        match self.shell.run(&self.target, "echo ready").await {
            Ok(output) if output.success() => PollResult::Ready(()),
            Ok(output) => {
                debug!(target = %self.target, code = ?output.code, "SSH not reachable yet");
                PollResult::Pending
            }
            Err(HypervisorError::ToolNotFound(tool)) => {
                PollResult::Failed(format!("tool not found: {tool}"))
            }
            Err(e) => {
                debug!(target = %self.target, error = %e, "SSH probe error");
                PollResult::Pending
            }
        }
    }
}

/// cloud-init の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudInitStatus {
    Done,
    Running,
    NotStarted,
    Error { detail: Option<String> },
    /// ゲストに cloud-init がない
    NotAvailable,
    /// 解釈できない出力
    Unknown(String),
}

impl CloudInitStatus {
    /// `cloud-init status --long` の出力を解釈する
    pub fn parse(output: &CommandOutput) -> Self {
        let text = output.combined();
        let lower = text.to_ascii_lowercase();

        if output.code == Some(127)
            || lower.contains("command not found")
            || lower.contains("cloud-init: not found")
        {
            return CloudInitStatus::NotAvailable;
        }

        let status = text.lines().find_map(|line| {
            line.trim()
                .strip_prefix("status:")
                .map(|s| s.trim().to_ascii_lowercase())
        });

        match status.as_deref() {
            Some("done") => CloudInitStatus::Done,
            Some("running") => CloudInitStatus::Running,
            Some("not started" | "not run") => CloudInitStatus::NotStarted,
            Some("error") => CloudInitStatus::Error {
                detail: error_detail(&text),
            },
            Some(other) => CloudInitStatus::Unknown(other.to_string()),
            None => CloudInitStatus::Unknown(text.trim().to_string()),
        }
    }
}

fn error_detail(text: &str) -> Option<String> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with("detail:"));
    let inline = lines.next()?.trim_start_matches("detail:").trim();
    if !inline.is_empty() {
        return Some(inline.to_string());
    }

    let rest: Vec<&str> = lines
        .take_while(|line| !line.is_empty() && !is_status_field(line))
        .collect();
    (!rest.is_empty()).then(|| rest.join(" "))
}

// `errors:` や `boot_status_code:` のようなキー行
fn is_status_field(line: &str) -> bool {
    line.split_once(':').is_some_and(|(key, _)| {
        !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// cloud-init 完了確認
pub struct CloudInitStatusProbe<'a> {
    shell: &'a dyn RemoteShell,
    target: String,
}

impl<'a> CloudInitStatusProbe<'a> {
    pub fn new(shell: &'a dyn RemoteShell, target: impl Into<String>) -> Self {
        Self {
            shell,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Probe for CloudInitStatusProbe<'_> {
    type Output = CloudInitStatus;

    fn name(&self) -> &str {
        "cloud-init"
    }

    async fn check(&mut self) -> PollResult<CloudInitStatus> {
        let output = match self.shell.run(&self.target, CLOUD_INIT_STATUS_COMMAND).await {
            Ok(output) if output.is_unreachable() => return PollResult::Pending,
            Ok(output) => output,
            Err(e) => {
                debug!(target = %self.target, error = %e, "cloud-init status query failed");
                return PollResult::Pending;
            }
        };

        match CloudInitStatus::parse(&output) {
            CloudInitStatus::Done => PollResult::Ready(CloudInitStatus::Done),
            CloudInitStatus::Error { detail } => PollResult::Failed(match detail {
                Some(detail) => format!("cloud-init reported error: {detail}"),
                None => "cloud-init reported error".to_string(),
            }),
            CloudInitStatus::NotAvailable => PollResult::Failed("not available".to_string()),
            CloudInitStatus::Running
            | CloudInitStatus::NotStarted
            | CloudInitStatus::Unknown(_) => PollResult::Pending,
        }
    }
}
