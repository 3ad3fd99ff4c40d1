//! Repair sessions: the exclusive lock, the isolated workspace and the
//! durable state that lets a session survive a restart.
//!
//! [`SessionManager`] owns the lifecycle. A started or resumed session is an
//! [`ActiveSession`], which the caller keeps until [`SessionManager::end`].

pub mod active;
pub mod lock;
pub mod manager;
pub mod persistence;
pub mod report;
pub mod state;

pub use active::{ActiveSession, ResultReport};
pub use lock::{lock_path, LockManager, LockRecord, LockStatus, SessionLock, LOCK_FILE};
pub use manager::{
    relative_plugin_path, CheckLevel, EndOutcome, PreflightCheck, PreflightReport, SessionManager,
};
pub use persistence::{read_state, state_path, tests_dir, write_state, STATE_FILE, TESTS_DIR};
pub use report::{render_report, report_path, write_report, REPORT_FILE};
pub use state::{ActiveFailure, SessionId, SessionState};

#[cfg(test)]
mod tests;
