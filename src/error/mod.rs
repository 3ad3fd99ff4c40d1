use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

pub type Result<T> = std::result::Result<T, HarnessError>;

/// The unified error type for the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Session already active on branch {branch} (PID {pid})")]
    SessionAlreadyActive { pid: u32, branch: String },

    #[error("No active session: {0}")]
    NoActiveSession(String),

    #[error("Plugin path not found: {}", .0.display())]
    PluginNotFound(PathBuf),

    #[error("{0}")]
    InvalidPlugin(String),

    #[error("git {operation} failed: {message}")]
    Git {
        operation: String,
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Build failed: {command}")]
    BuildFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Invalid test: {0}")]
    InvalidTest(String),

    #[error("Cache sync failed: {0}")]
    CacheSyncFailed(String),

    #[error("Reload failed: {0}")]
    ReloadFailed(String),

    #[error("Timed out after {after:?}: {command}")]
    Timeout { command: String, after: Duration },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error at {}: {message}", .path.display())]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HarnessError {
    pub fn git(
        operation: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn storage(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SessionAlreadyActive { .. } => ErrorCode::SessionAlreadyActive,
            Self::NoActiveSession(_) => ErrorCode::NoActiveSession,
            Self::PluginNotFound(_) => ErrorCode::PluginNotFound,
            Self::InvalidPlugin(_) => ErrorCode::InvalidPlugin,
            Self::Git { .. } => ErrorCode::GitError,
            Self::BuildFailed { .. } => ErrorCode::BuildFailed,
            Self::InvalidTest(_) => ErrorCode::InvalidTest,
            Self::CacheSyncFailed(_) => ErrorCode::CacheSyncFailed,
            Self::ReloadFailed(_) => ErrorCode::ReloadFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Storage { .. } => ErrorCode::StorageError,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code().is_transient()
    }

    /// Diagnostic key/value pairs shown beneath the message.
    pub fn context(&self) -> Vec<(&'static str, String)> {
        let mut ctx = Vec::new();
        match self {
            Self::SessionAlreadyActive { pid, branch } => {
                ctx.push(("pid", pid.to_string()));
                ctx.push(("branch", branch.clone()));
                ctx.push(("hint", format!("resume_session with branch {branch}")));
            }
            Self::Git {
                exit_code, stderr, ..
            } => {
                if let Some(code) = exit_code {
                    ctx.push(("exitCode", code.to_string()));
                }
                if !stderr.trim().is_empty() {
                    ctx.push(("stderr", stderr.trim().to_string()));
                }
            }
            Self::BuildFailed {
                exit_code, output, ..
            } => {
                if let Some(code) = exit_code {
                    ctx.push(("exitCode", code.to_string()));
                }
                if !output.trim().is_empty() {
                    ctx.push(("output", output.trim_end().to_string()));
                }
            }
            Self::Storage {
                source: Some(source),
                ..
            } => ctx.push(("cause", source.to_string())),
            _ => {}
        }
        ctx
    }

    /// Caller-facing rendering: `PTH Error [CODE]: message` plus context lines.
    pub fn user_message(&self) -> String {
        let mut msg = format!("PTH Error [{}]: {}", self.code(), self);
        for (key, value) in self.context() {
            msg.push_str(&format!("\n  {key}: {value}"));
        }
        msg
    }

    pub fn exit_code(&self) -> i32 {
        match self.code() {
            ErrorCode::InvalidRequest => 2,
            ErrorCode::Timeout => 124,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
