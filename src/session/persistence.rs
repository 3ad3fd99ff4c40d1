//! `SessionState` on disk: `<workspace>/.pth/session-state.json`.

use crate::error::{HarnessError, Result};
use crate::fix::SESSION_DIR;
use crate::storage::{read_optional, write_atomic};
use std::path::{Path, PathBuf};

use super::state::SessionState;

pub const STATE_FILE: &str = "session-state.json";
pub const TESTS_DIR: &str = "tests";

pub fn state_path(workspace: &Path) -> PathBuf {
    workspace.join(SESSION_DIR).join(STATE_FILE)
}

pub fn tests_dir(workspace: &Path) -> PathBuf {
    workspace.join(SESSION_DIR).join(TESTS_DIR)
}

pub fn write_state(workspace: &Path, state: &SessionState) -> Result<()> {
    let path = state_path(workspace);
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| HarnessError::storage(&path, "failed to serialize session state", e))?;
    write_atomic(&path, json.as_bytes())
}

/// `None` when the workspace has no state file. A corrupt file is an error.
pub fn read_state(workspace: &Path) -> Result<Option<SessionState>> {
    let path = state_path(workspace);
    match read_optional(&path)? {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| HarnessError::storage(&path, "malformed session state", e)),
    }
}
