//! Remote command execution

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Exit code used by OpenSSH when the connection itself failed
pub const SSH_CONNECTION_FAILED: i32 = 255;

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(Some(0), stdout, "")
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::new(Some(code), "", stderr)
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The remote host could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        self.code == Some(SSH_CONNECTION_FAILED)
    }

    /// Combined stdout and stderr, for parsers that accept either
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs commands on a guest
///
/// A non-zero remote exit status is returned as a `CommandOutput`, not as an
/// error. Errors are reserved for failures to run the local client.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` on `target` (`user@host`)
    async fn run(&self, target: &str, command: &str) -> Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_is_255() {
        assert!(CommandOutput::failed(255, "Connection timed out").is_unreachable());
        assert!(!CommandOutput::failed(1, "").is_unreachable());
        assert!(CommandOutput::ok("done").success());
    }

    #[test]
    fn test_combined() {
        assert_eq!(CommandOutput::new(Some(1), "a", "b").combined(), "a\nb");
        assert_eq!(CommandOutput::new(Some(1), "", "b").combined(), "b");
    }
}
