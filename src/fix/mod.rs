//! Fix Ledger: fixes are trailer-tagged commits, and the git log is their
//! only durable record.

pub mod applicator;
pub mod history;

pub use applicator::{apply_fix, repo_relative_path, FileChange, SESSION_DIR};
pub use history::{
    fix_records_from_log, get_fix_history, get_fix_history_since, revert_fix, FixRecord,
    RevertOutcome,
};

/// Id of the test a fix targets.
pub const TRAILER_TEST: &str = "PTH-Test";
/// Failure category of the targeted test.
pub const TRAILER_CATEGORY: &str = "PTH-Category";
/// Iteration the fix was applied in. Resume reads the highest value.
pub const TRAILER_ITERATION: &str = "PTH-Iteration";
/// Comma-separated repository-relative paths written by the fix.
pub const TRAILER_FILES: &str = "PTH-Files";
/// Commit kind, [`FIX_TYPE`] or [`SESSION_END_TYPE`].
pub const TRAILER_TYPE: &str = "PTH-Type";

pub const FIX_TYPE: &str = "fix";
/// Artifact commit written by `end_session`; never part of the fix history.
pub const SESSION_END_TYPE: &str = "session-end";
