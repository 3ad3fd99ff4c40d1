use crate::error::{HarnessError, Result};
use crate::plugin::PluginMode;
use crate::results::{ConvergenceTrend, IterationHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFailure {
    pub test_name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_diagnosis_summary: Option<String>,
}

/// Durable record of one repair session, stored inside its workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: SessionId,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub plugin_path: PathBuf,
    pub plugin_name: String,
    pub plugin_mode: PluginMode,
    /// Plugin directory relative to the repository root; empty at the root.
    #[serde(default)]
    pub plugin_rel_path: String,
    pub started_at: DateTime<Utc>,
    /// Completed iterations.
    pub iteration: u32,
    pub test_count: usize,
    pub passing_count: usize,
    pub failing_count: usize,
    #[serde(default)]
    pub convergence_trend: ConvergenceTrend,
    #[serde(default)]
    pub active_failures: Vec<ActiveFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_note: Option<String>,
    /// Commit the session branch started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default)]
    pub iteration_history: IterationHistory,
    /// Fixes committed since the last completed iteration.
    #[serde(default)]
    pub fixes_this_iteration: u32,
}

impl SessionState {
    /// Iteration number stamped on results and fixes recorded now.
    pub fn current_iteration(&self) -> u32 {
        self.iteration + 1
    }

    pub fn workspace_plugin_path(&self) -> PathBuf {
        if self.plugin_rel_path.is_empty() {
            self.worktree_path.clone()
        } else {
            self.worktree_path.join(&self.plugin_rel_path)
        }
    }

    /// Update the aggregate counts, keeping `passing + failing <= tests`.
    pub fn set_counts(&mut self, test_count: usize, passing: usize, failing: usize) -> Result<()> {
        if passing + failing > test_count {
            return Err(HarnessError::InvalidRequest(format!(
                "{passing} passing + {failing} failing exceeds {test_count} tests"
            )));
        }
        self.test_count = test_count;
        self.passing_count = passing;
        self.failing_count = failing;
        Ok(())
    }

    pub fn set_test_count(&mut self, test_count: usize) -> Result<()> {
        self.set_counts(test_count, self.passing_count, self.failing_count)
    }
}

#[cfg(test)]
pub(crate) fn sample_state() -> SessionState {
    use crate::results::IterationSummary;

    let mut history = IterationHistory::new();
    history.push(
        IterationSummary {
            iteration: 1,
            passing: 3,
            failing: 2,
            fixes_applied: 1,
        },
        10,
    );
    SessionState {
        session_id: SessionId::from_string("session-test".to_string()),
        branch: "pth/demo-2026-02-18-abc123".to_string(),
        worktree_path: PathBuf::from("/tmp/pth-worktree-demo-2026-02-18-abc123"),
        plugin_path: PathBuf::from("/src/demo"),
        plugin_name: "demo".to_string(),
        plugin_mode: PluginMode::Mcp,
        plugin_rel_path: String::new(),
        started_at: DateTime::parse_from_rfc3339("2026-02-18T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
        iteration: 1,
        test_count: 5,
        passing_count: 3,
        failing_count: 2,
        convergence_trend: ConvergenceTrend::Unknown,
        active_failures: vec![
            ActiveFailure {
                test_name: "get state".to_string(),
                category: "runtime-error".to_string(),
                last_diagnosis_summary: Some("entity missing".to_string()),
            },
            ActiveFailure {
                test_name: "list".to_string(),
                category: String::new(),
                last_diagnosis_summary: None,
            },
        ],
        session_note: Some("first pass".to_string()),
        base_commit: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        iteration_history: history,
        fixes_this_iteration: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_counts_enforces_total() {
        let mut state = sample_state();
        assert!(state.set_counts(5, 4, 1).is_ok());
        assert_eq!(state.passing_count, 4);
        let err = state.set_counts(5, 4, 2).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidRequest);
        assert_eq!(state.failing_count, 1);
        assert!(state.set_test_count(4).is_err());
    }

    #[test]
    fn test_workspace_plugin_path() {
        let mut state = sample_state();
        assert_eq!(state.workspace_plugin_path(), state.worktree_path);
        state.plugin_rel_path = "plugins/demo".to_string();
        assert!(state.workspace_plugin_path().ends_with("plugins/demo"));
        assert_eq!(state.current_iteration(), 2);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(json["sessionId"], "session-test");
        assert_eq!(json["pluginMode"], "mcp");
        assert_eq!(json["convergenceTrend"], "unknown");
        assert_eq!(json["activeFailures"][0]["lastDiagnosisSummary"], "entity missing");
        assert_eq!(json["iterationHistory"][0]["passing"], 3);
    }
}
