use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshots considered by [`classify`].
pub const TREND_WINDOW: usize = 4;

/// Pass and fail counts of one completed iteration, as the classifier sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    pub passing: usize,
    pub failing: usize,
}

impl IterationSnapshot {
    pub fn new(passing: usize, failing: usize) -> Self {
        Self { passing, failing }
    }
}

/// Direction of the repair loop over the trailing window.
///
/// Serialized in lowercase, which is also what [`fmt::Display`] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceTrend {
    /// More tests pass now than at the start of the window.
    Improving,
    /// The pass count has not moved for the whole window.
    Plateaued,
    /// The pass count went both up and down inside the window.
    Oscillating,
    /// Fewer tests pass now than at the start of the window.
    Declining,
    /// Fewer than two snapshots.
    #[default]
    Unknown,
}

impl ConvergenceTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvergenceTrend::Improving => "improving",
            ConvergenceTrend::Plateaued => "plateaued",
            ConvergenceTrend::Oscillating => "oscillating",
            ConvergenceTrend::Declining => "declining",
            ConvergenceTrend::Unknown => "unknown",
        }
    }

    /// One-line advice shown next to the trend.
    pub fn recommendation(&self) -> &'static str {
        match self {
            ConvergenceTrend::Improving => "Keep iterating; the pass count is rising.",
            ConvergenceTrend::Plateaued => {
                "Try a different fix strategy; the pass count has stalled."
            }
            ConvergenceTrend::Oscillating => {
                "Use get_test_impact and get_fix_history to find the regressing fix."
            }
            ConvergenceTrend::Declining => {
                "The pass count is falling; consider revert_fix before continuing."
            }
            ConvergenceTrend::Unknown => "Not enough iterations yet to detect a trend.",
        }
    }
}

impl fmt::Display for ConvergenceTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the trajectory of the trailing [`TREND_WINDOW`] snapshots.
///
/// Checks run in order: plateau, then oscillation, then the first/last
/// comparison, so a flat window is never reported as oscillating.
pub fn classify(snapshots: &[IterationSnapshot]) -> ConvergenceTrend {
    if snapshots.len() < 2 {
        return ConvergenceTrend::Unknown;
    }

    let start = snapshots.len().saturating_sub(TREND_WINDOW);
    let passing: Vec<i64> = snapshots[start..]
        .iter()
        .map(|s| s.passing as i64)
        .collect();
    let last = passing[passing.len() - 1];

    let tail = &passing[passing.len().saturating_sub(3)..];
    if tail.iter().all(|&v| v == last) {
        return ConvergenceTrend::Plateaued;
    }

    if passing.len() >= 3 {
        let diffs: Vec<i64> = passing
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d != 0)
            .collect();
        let reversals = diffs
            .windows(2)
            .filter(|w| w[0].signum() != w[1].signum())
            .count();
        if reversals >= 2 {
            return ConvergenceTrend::Oscillating;
        }
    }

    let first = passing[0];
    match last.cmp(&first) {
        std::cmp::Ordering::Greater => ConvergenceTrend::Improving,
        std::cmp::Ordering::Less => ConvergenceTrend::Declining,
        std::cmp::Ordering::Equal => ConvergenceTrend::Unknown,
    }
}
