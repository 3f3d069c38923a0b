//! OpenSSH remote shell

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use vmflow_hypervisor::{CommandOutput, HypervisorError, RemoteShell, Result};

/// Options applied to every connection
///
/// Guests are disposable, so host keys are neither checked nor recorded.
const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
    "-o",
    "ConnectionAttempts=1",
    "-o",
    "LogLevel=ERROR",
];

/// `ssh` client based remote shell
pub struct OpenSsh {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl OpenSsh {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }

    pub fn args(&self, target: &str, command: &str) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)));
        args.push(target.to_string());
        args.push(command.to_string());
        args
    }
}

impl Default for OpenSsh {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(30))
    }
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn run(&self, target: &str, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.args(target, command));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: ssh {} {}", target, command);

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                HypervisorError::Timeout(format!(
                    "ssh {target} did not finish within {}s",
                    self.command_timeout.as_secs()
                ))
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HypervisorError::ToolNotFound("ssh".to_string()),
                _ => HypervisorError::Io(e),
            })?;

        Ok(CommandOutput::new(
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_connect_timeout_and_target_last() {
        let ssh = OpenSsh::default();
        let args = ssh.args("ubuntu@10.0.0.5", "hostname");
        assert!(args.contains(&"ConnectTimeout=3".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert_eq!(&args[args.len() - 2..], ["ubuntu@10.0.0.5", "hostname"]);
    }
}
