//! Advisory, liveness-checked session lock.
//!
//! The lock is a JSON record `{pid, branch, startedAt}` under the plugin's
//! working directory. A lock whose pid is no longer running is abandoned and
//! may be taken over without manual cleanup.

use crate::error::{HarnessError, Result};
use crate::fix::SESSION_DIR;
use crate::plugin::ProcessControl;
use crate::storage::{read_optional, remove_if_exists, write_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const LOCK_FILE: &str = "active-session.lock";

pub fn lock_path(plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(SESSION_DIR).join(LOCK_FILE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub pid: u32,
    pub branch: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    /// Held by a running process.
    Held(LockRecord),
    /// Recorded process is gone.
    Stale(LockRecord),
    /// A lock file exists but cannot be parsed.
    Unreadable(String),
}

/// Proof of lock ownership, returned by [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLock {
    pub path: PathBuf,
    pub record: LockRecord,
}

pub struct LockManager {
    control: Arc<dyn ProcessControl>,
    pid: u32,
}

impl LockManager {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self::with_pid(control, std::process::id())
    }

    /// A manager that writes `pid` as the owner instead of this process.
    pub fn with_pid(control: Arc<dyn ProcessControl>, pid: u32) -> Self {
        Self { control, pid }
    }

    pub fn inspect(&self, plugin_dir: &Path) -> Result<LockStatus> {
        let path = lock_path(plugin_dir);
        let Some(text) = read_optional(&path)? else {
            return Ok(LockStatus::Free);
        };
        Ok(match serde_json::from_str::<LockRecord>(&text) {
            Ok(record) if self.control.is_alive(record.pid) => LockStatus::Held(record),
            Ok(record) => LockStatus::Stale(record),
            Err(e) => LockStatus::Unreadable(e.to_string()),
        })
    }

    /// Take the lock for `branch`, recovering an abandoned one.
    pub fn acquire(&self, plugin_dir: &Path, branch: &str) -> Result<SessionLock> {
        let path = lock_path(plugin_dir);
        let record = LockRecord {
            pid: self.pid,
            branch: branch.to_string(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| HarnessError::storage(&path, "failed to serialize lock", e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HarnessError::storage(parent, "failed to create lock dir", e))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&json)
                    .map_err(|e| HarnessError::storage(&path, "failed to write lock", e))?;
                tracing::debug!(pid = self.pid, branch = %branch, "Acquired session lock");
                return Ok(SessionLock { path, record });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(HarnessError::storage(&path, "failed to create lock", e)),
        }

        match self.inspect(plugin_dir)? {
            LockStatus::Held(existing) => {
                return Err(HarnessError::SessionAlreadyActive {
                    pid: existing.pid,
                    branch: existing.branch,
                })
            }
            LockStatus::Stale(existing) => tracing::warn!(
                stale_pid = existing.pid,
                stale_branch = %existing.branch,
                "Recovering abandoned session lock"
            ),
            LockStatus::Unreadable(reason) => {
                tracing::warn!("Replacing unreadable session lock: {}", reason)
            }
            LockStatus::Free => {}
        }

        write_atomic(&path, &json)?;

        // Another process may have recovered the same stale lock concurrently.
        match self.inspect(plugin_dir)? {
            LockStatus::Held(current) | LockStatus::Stale(current) if current.pid != self.pid => {
                Err(HarnessError::SessionAlreadyActive {
                    pid: current.pid,
                    branch: current.branch,
                })
            }
            _ => {
                tracing::debug!(pid = self.pid, branch = %branch, "Acquired session lock");
                Ok(SessionLock { path, record })
            }
        }
    }

    /// Delete the lock if it is still ours. Idempotent.
    pub fn release(&self, lock: &SessionLock) -> Result<()> {
        let current = match read_optional(&lock.path)? {
            None => return Ok(()),
            Some(text) => serde_json::from_str::<LockRecord>(&text).ok(),
        };
        match current {
            Some(record)
                if record.pid != lock.record.pid || record.branch != lock.record.branch =>
            {
                tracing::warn!(
                    pid = record.pid,
                    branch = %record.branch,
                    "Session lock now belongs to another session, leaving it"
                );
                Ok(())
            }
            _ => {
                remove_if_exists(&lock.path)?;
                tracing::debug!(branch = %lock.record.branch, "Released session lock");
                Ok(())
            }
        }
    }
}
