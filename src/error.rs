use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the sandbox. `Configuration` and `WorkspaceMissing` are
/// fatal at startup; every other variant is translated into a structured
/// tool payload and never tears down the server.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("workspace not found: {0}")]
    WorkspaceMissing(PathBuf),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to spawn container runtime: {0}")]
    Spawn(String),

    #[error("unknown session")]
    UnknownSession,

    #[error("process not running")]
    NotRunning,

    #[error("process already exited")]
    AlreadyExited,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Message safe to return to the MCP client: no workspace paths or raw
    /// runtime stderr leak through, mirroring the redaction discipline of
    /// upstream-facing error variants elsewhere in this codebase.
    pub fn user_message(&self) -> String {
        match self {
            Self::WorkspaceMissing(_) => "workspace not found".to_string(),
            Self::Configuration(msg) => msg.clone(),
            Self::Spawn(_) => "failed to start sandbox container".to_string(),
            Self::UnknownSession => "unknown session".to_string(),
            Self::NotRunning => "process not running".to_string(),
            Self::AlreadyExited => "process already exited".to_string(),
            Self::Io(_) => "io error".to_string(),
        }
    }
}
