use crate::error::HarnessError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("{command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl From<ProcessError> for HarnessError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { command, after } => HarnessError::Timeout { command, after },
            ProcessError::CommandNotFound(ref program) => HarnessError::InvalidRequest(format!(
                "required program '{program}' is not installed or not on PATH"
            )),
            ProcessError::Io { command, source } => {
                HarnessError::storage(command, "failed to run process", source)
            }
            ProcessError::MockExpectationNotMet(msg) => HarnessError::InvalidRequest(msg),
        }
    }
}
