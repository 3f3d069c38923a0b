//! Hypervisor error types

use thiserror::Error;

/// Errors raised at the external command boundary
#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("{verb} failed: {stderr}")]
    CommandFailed { verb: String, stderr: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unexpected output from {verb}: {message}")]
    Parse { verb: String, message: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HypervisorError {
    pub fn command_failed(verb: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            verb: verb.into(),
            stderr: stderr.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HypervisorError>;
