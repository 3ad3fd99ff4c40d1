//! Final Markdown report written when a session ends.

use crate::error::Result;
use crate::fix::SESSION_DIR;
use crate::results::TestResult;
use crate::storage::write_atomic;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::state::SessionState;

pub const REPORT_FILE: &str = "SESSION-REPORT.md";

pub fn report_path(workspace: &Path) -> PathBuf {
    workspace.join(SESSION_DIR).join(REPORT_FILE)
}

pub fn render_report(
    state: &SessionState,
    results: &[&TestResult],
    ended_at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "# PTH Session Report".to_string(),
        String::new(),
        format!("**Plugin:** {}", state.plugin_name),
        format!("**Mode:** {}", state.plugin_mode),
        format!("**Branch:** {}", state.branch),
        format!("**Started:** {}", state.started_at.to_rfc3339()),
        format!("**Ended:** {}", ended_at.to_rfc3339()),
        format!("**Total Iterations:** {}", state.iteration),
    ];
    if let Some(note) = &state.session_note {
        lines.push(format!("**Note:** {note}"));
    }

    lines.extend([
        String::new(),
        "## Test Results".to_string(),
        String::new(),
        "| Tests | Passing | Failing |".to_string(),
        "|-------|---------|---------|".to_string(),
        format!(
            "| {} | {} | {} |",
            state.test_count, state.passing_count, state.failing_count
        ),
    ]);

    if !results.is_empty() {
        lines.extend([
            String::new(),
            "| Test | Status | Iteration | Failure |".to_string(),
            "|------|--------|-----------|---------|".to_string(),
        ]);
        for result in results {
            lines.push(format!(
                "| {} | {} {} | {} | {} |",
                escape_cell(&result.test_name),
                result.status.icon(),
                result.status,
                result.iteration,
                result.failure_reason.as_deref().map(escape_cell).unwrap_or_default()
            ));
        }
    }

    lines.extend([
        String::new(),
        "## Convergence".to_string(),
        String::new(),
        format!("Final trend: {}", state.convergence_trend),
        String::new(),
        state.iteration_history.markdown_table(),
        String::new(),
        "## Status".to_string(),
        String::new(),
        if state.failing_count == 0 {
            format!("All {} tests passing.", state.passing_count)
        } else {
            format!("{} tests still failing at session end.", state.failing_count)
        },
    ]);
    lines.join("\n") + "\n"
}

pub fn write_report(workspace: &Path, report: &str) -> Result<PathBuf> {
    let path = report_path(workspace);
    write_atomic(&path, report.as_bytes())?;
    Ok(path)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
