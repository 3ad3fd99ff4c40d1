use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes surfaced to callers alongside every failure.
///
/// The string form is part of the tool protocol: agents branch on it to decide
/// whether to resume, retry the outer loop, or stop and ask a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionAlreadyActive,
    NoActiveSession,
    PluginNotFound,
    InvalidPlugin,
    GitError,
    BuildFailed,
    InvalidTest,
    CacheSyncFailed,
    ReloadFailed,
    Timeout,
    InvalidRequest,
    StorageError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 12] = [
        ErrorCode::SessionAlreadyActive,
        ErrorCode::NoActiveSession,
        ErrorCode::PluginNotFound,
        ErrorCode::InvalidPlugin,
        ErrorCode::GitError,
        ErrorCode::BuildFailed,
        ErrorCode::InvalidTest,
        ErrorCode::CacheSyncFailed,
        ErrorCode::ReloadFailed,
        ErrorCode::Timeout,
        ErrorCode::InvalidRequest,
        ErrorCode::StorageError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SessionAlreadyActive => "SESSION_ALREADY_ACTIVE",
            ErrorCode::NoActiveSession => "NO_ACTIVE_SESSION",
            ErrorCode::PluginNotFound => "PLUGIN_NOT_FOUND",
            ErrorCode::InvalidPlugin => "INVALID_PLUGIN",
            ErrorCode::GitError => "GIT_ERROR",
            ErrorCode::BuildFailed => "BUILD_FAILED",
            ErrorCode::InvalidTest => "INVALID_TEST",
            ErrorCode::CacheSyncFailed => "CACHE_SYNC_FAILED",
            ErrorCode::ReloadFailed => "RELOAD_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::StorageError => "STORAGE_ERROR",
        }
    }

    /// Transient failures may succeed if the calling agent retries its outer
    /// loop later; everything else needs the input or environment fixed first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::SessionAlreadyActive
                | ErrorCode::Timeout
                | ErrorCode::CacheSyncFailed
                | ErrorCode::ReloadFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short human description of an error code, used by `pth tools --codes`.
pub fn describe_error_code(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::SessionAlreadyActive => {
            "A live process holds the session lock for this plugin; resume its branch or wait"
        }
        ErrorCode::NoActiveSession => "The operation needs an active session; start or resume one",
        ErrorCode::PluginNotFound => "The plugin path does not exist",
        ErrorCode::InvalidPlugin => "The plugin path or the requested change is not usable",
        ErrorCode::GitError => "A git invocation failed; stderr is attached",
        ErrorCode::BuildFailed => "An install or build command failed; output is attached",
        ErrorCode::InvalidTest => "A test definition is malformed or collides with an existing id",
        ErrorCode::CacheSyncFailed => "Build succeeded but copying into the plugin cache failed",
        ErrorCode::ReloadFailed => "Build succeeded but the running plugin could not be restarted",
        ErrorCode::Timeout => "An external command did not finish within its time limit",
        ErrorCode::InvalidRequest => "The request arguments are malformed",
        ErrorCode::StorageError => "Reading or writing harness state on disk failed",
    }
}
