use crate::error::{HarnessError, Result};
use crate::plugin::BuildSystem;
use crate::results::{
    classify, ConvergenceTrend, IterationSummary, ResultsTracker, TestResult, TestStatus,
};
use crate::suite::TestStore;
use chrono::Utc;
use std::path::{Path, PathBuf};

use super::lock::SessionLock;
use super::persistence::{tests_dir, write_state};
use super::state::{ActiveFailure, SessionState};

/// A test outcome reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    pub test_id: String,
    pub status: TestStatus,
    pub duration_ms: Option<u64>,
    pub failure_reason: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
}

impl ResultReport {
    pub fn new(test_id: impl Into<String>, status: TestStatus) -> Self {
        Self {
            test_id: test_id.into(),
            status,
            duration_ms: None,
            failure_reason: None,
            notes: None,
            category: None,
        }
    }
}

/// Everything owned by a live session. Created by
/// [`SessionManager::start`](super::SessionManager::start) or
/// [`resume`](super::SessionManager::resume) and finished by
/// [`end`](super::SessionManager::end).
#[derive(Debug)]
pub struct ActiveSession {
    pub state: SessionState,
    pub tests: TestStore,
    pub results: ResultsTracker,
    pub build: BuildSystem,
    /// State was rebuilt from the fix log because no state file existed.
    pub state_reconstructed: bool,
    /// The install step has run in this worktree since the session attached.
    pub dependencies_installed: bool,
    pub(crate) lock: SessionLock,
    pub(crate) repo_root: PathBuf,
    pub(crate) history_window: usize,
}

impl ActiveSession {
    pub fn workspace(&self) -> &Path {
        &self.state.worktree_path
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn persist_state(&self) -> Result<()> {
        write_state(self.workspace(), &self.state)
    }

    /// Write the test definitions and the updated test count.
    pub fn persist_tests(&mut self) -> Result<()> {
        self.tests.persist(&tests_dir(self.workspace()))?;
        self.state.set_test_count(self.tests.count())?;
        self.persist_state()
    }

    /// Append a result for the in-progress iteration and refresh the
    /// aggregate counts and active failures.
    pub fn record_result(&mut self, report: ResultReport) -> Result<TestResult> {
        if report.status == TestStatus::Pending {
            return Err(HarnessError::InvalidRequest(
                "status must be passing, failing or skipped".to_string(),
            ));
        }
        let test = self.tests.get(&report.test_id).ok_or_else(|| {
            HarnessError::InvalidRequest(format!("unknown test id: {}", report.test_id))
        })?;

        let result = TestResult {
            test_id: test.id.clone(),
            test_name: test.name.clone(),
            status: report.status,
            iteration: self.state.current_iteration(),
            duration_ms: report.duration_ms,
            failure_reason: report.failure_reason,
            notes: report.notes,
            recorded_at: Utc::now(),
        };
        self.results.record(result.clone());

        self.state.set_counts(
            self.tests.count(),
            self.results.pass_count(),
            self.results.fail_count(),
        )?;
        self.state.active_failures = self.active_failures(&result, report.category);
        self.persist_state()?;
        Ok(result)
    }

    fn active_failures(&self, latest: &TestResult, category: Option<String>) -> Vec<ActiveFailure> {
        self.results
            .failing_tests()
            .into_iter()
            .map(|failing| {
                let reported = (failing.test_id == latest.test_id)
                    .then(|| category.clone())
                    .flatten();
                let category = reported
                    .or_else(|| {
                        self.state
                            .active_failures
                            .iter()
                            .find(|f| f.test_name == failing.test_name)
                            .map(|f| f.category.clone())
                    })
                    .unwrap_or_default();
                ActiveFailure {
                    test_name: failing.test_name.clone(),
                    category,
                    last_diagnosis_summary: failing.failure_reason.clone(),
                }
            })
            .collect()
    }

    pub fn note_fix_applied(&mut self) -> Result<()> {
        self.state.fixes_this_iteration += 1;
        self.persist_state()
    }

    /// Close the in-progress iteration: snapshot the tracker, advance the
    /// counter and reclassify the trend.
    ///
    /// With no results recorded (a fresh resume, for one) the counter still
    /// advances but no snapshot is taken and `None` is returned, so an empty
    /// tracker never reads as a drop to zero passing.
    pub fn complete_iteration(&mut self) -> Result<Option<IterationSummary>> {
        if self.results.is_empty() {
            let iteration = self.state.current_iteration();
            self.state.iteration = iteration;
            self.state.fixes_this_iteration = 0;
            self.persist_state()?;
            tracing::warn!(
                iteration,
                "Completed iteration without recorded results, no snapshot taken"
            );
            return Ok(None);
        }

        let summary = IterationSummary {
            iteration: self.state.current_iteration(),
            passing: self.results.pass_count(),
            failing: self.results.fail_count(),
            fixes_applied: self.state.fixes_this_iteration,
        };
        self.state
            .iteration_history
            .push(summary, self.history_window);
        self.state.iteration = summary.iteration;
        self.state.fixes_this_iteration = 0;
        self.state.convergence_trend = self.trend();
        self.persist_state()?;
        tracing::info!(
            iteration = summary.iteration,
            passing = summary.passing,
            failing = summary.failing,
            trend = %self.state.convergence_trend,
            "Completed iteration"
        );
        Ok(Some(summary))
    }

    pub fn trend(&self) -> ConvergenceTrend {
        classify(&self.state.iteration_history.snapshots())
    }
}
