use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

impl ProcessCommand {
    /// Shell-quoted rendering used in logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// stdout followed by stderr, for build logs where both matter.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, _) => self.stderr.trim_end().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // A timed-out child is dropped with its future; make sure it dies too.
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(command: &ProcessCommand, source: std::io::Error) -> ProcessError {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::Io {
                command: command.display(),
                source,
            }
        }
    }

    async fn write_stdin(
        child: &mut tokio::process::Child,
        command: &ProcessCommand,
        stdin_data: &str,
    ) -> Result<(), ProcessError> {
        use tokio::io::AsyncWriteExt;

        if let Some(mut stdin) = child.stdin.take() {
            let io_err = |source| ProcessError::Io {
                command: command.display(),
                source,
            };
            stdin.write_all(stdin_data.as_bytes()).await.map_err(io_err)?;
            stdin.shutdown().await.map_err(io_err)?;
        }
        Ok(())
    }

    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            return ExitStatus::Success;
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }
        ExitStatus::Error(status.code().unwrap_or(-1))
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        tracing::debug!(
            command = %command.display(),
            dir = ?command.working_dir,
            timeout = ?command.timeout,
            "Spawning"
        );

        let start = Instant::now();
        let mut child = Self::configure_command(&command)
            .spawn()
            .map_err(|e| Self::spawn_error(&command, e))?;

        if let Some(ref stdin_data) = command.stdin {
            Self::write_stdin(&mut child, &command, stdin_data).await?;
        }

        let output = match command.timeout {
            Some(after) => match tokio::time::timeout(after, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(command = %command.display(), ?after, "Timed out");
                    return Err(ProcessError::Timeout {
                        command: command.display(),
                        after,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| ProcessError::Io {
            command: command.display(),
            source,
        })?;

        let status = Self::parse_exit_status(output.status);
        let duration = start.elapsed();
        tracing::debug!(program = %command.program, ?status, ?duration, "Exited");

        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}
