use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a test run. `Pending` is only ever derived, never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Passing,
    Failing,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Passing => "passing",
            TestStatus::Failing => "failing",
            TestStatus::Skipped => "skipped",
        }
    }

    /// Glyph used in listings and reports.
    pub fn icon(&self) -> char {
        match self {
            TestStatus::Passing => '✓',
            TestStatus::Failing => '✗',
            TestStatus::Pending | TestStatus::Skipped => '○',
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TestStatus::Pending),
            "passing" => Ok(TestStatus::Passing),
            "failing" => Ok(TestStatus::Failing),
            "skipped" => Ok(TestStatus::Skipped),
            other => Err(format!("unknown test status '{other}'")),
        }
    }
}

/// One externally reported execution of one test. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_id: String,
    pub test_name: String,
    pub status: TestStatus,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
