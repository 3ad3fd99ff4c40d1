use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Scripted [`ProcessRunner`] for tests.
///
/// Expectations are matched in registration order. The first one whose
/// program and argument matcher accept the command, and that has calls left,
/// answers it. Every command is recorded whether or not it matched.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<Expectation>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct Expectation {
    program: String,
    matcher: Option<ArgsMatcher>,
    reply: Reply,
    remaining: Option<usize>,
}

impl Expectation {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self.remaining != Some(0)
            && self.matcher.as_ref().map_or(true, |m| m(&command.args))
    }
}

enum Reply {
    Exit {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    Timeout(Duration),
    NotFound,
}

impl Reply {
    fn answer(&self, command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        match self {
            Reply::Exit {
                status,
                stdout,
                stderr,
            } => Ok(ProcessOutput {
                status: status.clone(),
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                duration: Duration::from_millis(1),
            }),
            Reply::Timeout(after) => Err(ProcessError::Timeout {
                command: command.display(),
                after: *after,
            }),
            Reply::NotFound => Err(ProcessError::CommandNotFound(command.program.clone())),
        }
    }
}

/// Builder returned by [`MockProcessRunner::expect_command`]; registered by
/// [`finish`](MockCommandConfig::finish).
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: Expectation,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: Expectation {
                program: program.to_string(),
                matcher: None,
                reply: Reply::Exit {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                },
                remaining: None,
            },
        }
    }

    pub fn call_count(&self, program: &str) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|cmd| cmd.program == program)
            .count()
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        guard(&self.calls).push(command.clone());

        let mut expectations = guard(&self.expectations);
        let Some(expectation) = expectations.iter_mut().find(|e| e.accepts(&command)) else {
            return Err(ProcessError::MockExpectationNotMet(format!(
                "unexpected command: {}",
                command.display()
            )));
        };
        if let Some(remaining) = expectation.remaining.as_mut() {
            *remaining -= 1;
        }
        expectation.reply.answer(&command)
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.matcher = Some(Box::new(matcher));
        self
    }

    /// Match commands whose arguments start with `prefix`.
    pub fn with_arg_prefix(self, prefix: &[&str]) -> Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        self.with_args(move |args| args.starts_with(&prefix))
    }

    fn exit_reply(&mut self) -> (&mut ExitStatus, &mut String, &mut String) {
        if !matches!(self.expectation.reply, Reply::Exit { .. }) {
            self.expectation.reply = Reply::Exit {
                status: ExitStatus::Success,
                stdout: String::new(),
                stderr: String::new(),
            };
        }
        match &mut self.expectation.reply {
            Reply::Exit {
                status,
                stdout,
                stderr,
            } => (status, stdout, stderr),
            _ => unreachable!("reply was just set to Exit"),
        }
    }

    pub fn returns_stdout(mut self, text: &str) -> Self {
        *self.exit_reply().1 = text.to_string();
        self
    }

    pub fn returns_stderr(mut self, text: &str) -> Self {
        *self.exit_reply().2 = text.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        *self.exit_reply().0 = match code {
            0 => ExitStatus::Success,
            code => ExitStatus::Error(code),
        };
        self
    }

    pub fn returns_success(self) -> Self {
        self.returns_exit_code(0)
    }

    pub fn returns_timeout(mut self, after: Duration) -> Self {
        self.expectation.reply = Reply::Timeout(after);
        self
    }

    pub fn returns_not_found(mut self) -> Self {
        self.expectation.reply = Reply::NotFound;
        self
    }

    /// Answer at most `n` calls, then fall through to later expectations.
    pub fn times(mut self, n: usize) -> Self {
        self.expectation.remaining = Some(n);
        self
    }

    pub fn finish(self) {
        guard(&self.runner.expectations).push(self.expectation);
    }
}
