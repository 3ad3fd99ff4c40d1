//! Results Tracker and Convergence Classifier.

pub mod convergence;
pub mod history;
pub mod tracker;
pub mod types;

pub use convergence::{classify, ConvergenceTrend, IterationSnapshot, TREND_WINDOW};
pub use history::{IterationHistory, IterationSummary};
pub use tracker::ResultsTracker;
pub use types::{TestResult, TestStatus};
