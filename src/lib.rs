//! # pth
//!
//! Session and convergence engine for a test-fix-retest plugin harness.
//!
//! A session locks a plugin directory, checks the repository out onto an
//! isolated branch and workspace, and records every fix as a trailer-tagged
//! commit. Test results feed a convergence classifier that tells the caller
//! whether iterating is still paying off.
//!
//! ## Modules
//!
//! - `session` - lock, lifecycle manager and persisted session state
//! - `worktree` - isolated branch-scoped workspaces
//! - `fix` - fix ledger derived from the git log
//! - `suite` - test definitions, YAML parsing, store and generation
//! - `results` - results tracker and convergence classification
//! - `plugin` - plugin detection, build, cache sync and reload
//! - `tools` - caller-facing operations and the JSON-lines transport
//! - `git` - typed wrapper over the git binary
//! - `subprocess` - process execution abstraction for testing
pub mod app;
pub mod config;
pub mod error;
pub mod fix;
pub mod git;
pub mod plugin;
pub mod results;
pub mod session;
pub mod storage;
pub mod subprocess;
pub mod suite;
pub mod tools;
pub mod worktree;

#[cfg(test)]
mod testing;
