use std::collections::HashMap;

use super::types::{TestResult, TestStatus};

/// Per-test result history for the current process. Not persisted: tests
/// re-run after a resume repopulate it.
#[derive(Debug, Default, Clone)]
pub struct ResultsTracker {
    results: HashMap<String, Vec<TestResult>>,
    /// Test ids in the order they were first recorded.
    order: Vec<String>,
}

impl ResultsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the test's history; earlier results are never replaced.
    pub fn record(&mut self, result: TestResult) {
        let history = self
            .results
            .entry(result.test_id.clone())
            .or_insert_with(|| {
                self.order.push(result.test_id.clone());
                Vec::new()
            });
        history.push(result);
    }

    /// Every result recorded for `test_id`, oldest first. Empty for unknown ids.
    pub fn get_history(&self, test_id: &str) -> &[TestResult] {
        self.results
            .get(test_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get_latest(&self, test_id: &str) -> Option<&TestResult> {
        self.results.get(test_id).and_then(|history| history.last())
    }

    /// Status of the newest result, or [`TestStatus::Pending`] if none was recorded.
    pub fn latest_status(&self, test_id: &str) -> TestStatus {
        self.get_latest(test_id)
            .map_or(TestStatus::Pending, |result| result.status)
    }

    fn count_latest(&self, status: TestStatus) -> usize {
        self.all_latest()
            .into_iter()
            .filter(|result| result.status == status)
            .count()
    }

    /// Tests whose latest result is passing. Older results do not count.
    pub fn pass_count(&self) -> usize {
        self.count_latest(TestStatus::Passing)
    }

    pub fn fail_count(&self) -> usize {
        self.count_latest(TestStatus::Failing)
    }

    pub fn failing_tests(&self) -> Vec<&TestResult> {
        self.all_latest()
            .into_iter()
            .filter(|result| result.status == TestStatus::Failing)
            .collect()
    }

    /// Latest result per test, in first-recorded order.
    pub fn all_latest(&self) -> Vec<&TestResult> {
        self.order
            .iter()
            .filter_map(|id| self.get_latest(id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
