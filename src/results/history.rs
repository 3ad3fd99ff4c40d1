use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::convergence::IterationSnapshot;

/// Aggregates captured when an iteration completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationSummary {
    /// 1-based number of the iteration that was closed.
    pub iteration: u32,
    pub passing: usize,
    pub failing: usize,
    pub fixes_applied: u32,
}

/// Rolling window of completed iterations, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationHistory {
    entries: VecDeque<IterationSummary>,
}

impl IterationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, dropping the oldest entries beyond `capacity`.
    pub fn push(&mut self, summary: IterationSummary, capacity: usize) {
        self.entries.push_back(summary);
        while self.entries.len() > capacity.max(1) {
            self.entries.pop_front();
        }
    }

    /// Counts only, oldest first, for [`classify`](super::classify).
    pub fn snapshots(&self) -> Vec<IterationSnapshot> {
        self.entries
            .iter()
            .map(|s| IterationSnapshot::new(s.passing, s.failing))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IterationSummary> {
        self.entries.iter()
    }

    /// Most recently completed iteration.
    pub fn last(&self) -> Option<&IterationSummary> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Markdown table used by the status tool and the session report.
    pub fn markdown_table(&self) -> String {
        let mut lines = vec![
            "| Iteration | Passing | Failing | Fixes Applied |".to_string(),
            "|-----------|---------|---------|---------------|".to_string(),
        ];
        if self.entries.is_empty() {
            lines.push("| - | - | - | - |".to_string());
        }
        for s in &self.entries {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                s.iteration, s.passing, s.failing, s.fixes_applied
            ));
        }
        lines.join("\n")
    }
}
