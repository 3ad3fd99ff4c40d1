use crate::error::{HarnessError, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::detector::BuildSystem;

/// Captured output of the steps that ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub commands: Vec<String>,
    pub output: String,
}

impl BuildReport {
    pub fn ran_anything(&self) -> bool {
        !self.commands.is_empty()
    }
}

#[derive(Clone)]
pub struct BuildRunner {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl BuildRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Install dependencies, then build.
    pub async fn install_and_build(&self, dir: &Path, build: &BuildSystem) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        for argv in [&build.install_command, &build.build_command]
            .into_iter()
            .flatten()
        {
            self.run_step(dir, argv, &mut report).await?;
        }
        Ok(report)
    }

    /// Build only; used by reload where dependencies are already installed.
    pub async fn build_only(&self, dir: &Path, build: &BuildSystem) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        if let Some(argv) = &build.build_command {
            self.run_step(dir, argv, &mut report).await?;
        }
        Ok(report)
    }

    async fn run_step(&self, dir: &Path, argv: &[String], report: &mut BuildReport) -> Result<()> {
        let Some(builder) = ProcessCommandBuilder::from_argv(argv) else {
            return Ok(());
        };
        let command = builder
            .current_dir(dir)
            .timeout(self.timeout)
            .build();
        let command_line = command.display();
        tracing::info!(command = %command_line, "Running build step");

        let output = match self.runner.run(command).await {
            Ok(output) => output,
            Err(ProcessError::CommandNotFound(program)) => {
                return Err(HarnessError::BuildFailed {
                    command: command_line,
                    exit_code: None,
                    output: format!("{program}: command not found"),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let combined = output.combined();
        report.commands.push(command_line.clone());
        if !combined.is_empty() {
            if !report.output.is_empty() {
                report.output.push('\n');
            }
            report.output.push_str(&combined);
        }

        if !output.status.success() {
            return Err(HarnessError::BuildFailed {
                command: command_line,
                exit_code: output.status.code(),
                output: report.output.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::plugin::detector::Language;
    use crate::subprocess::MockProcessRunner;

    fn npm_build() -> BuildSystem {
        BuildSystem {
            install_command: Some(vec!["npm".into(), "install".into()]),
            build_command: Some(vec!["npm".into(), "run".into(), "build".into()]),
            start_command: None,
            language: Language::Typescript,
        }
    }

    #[tokio::test]
    async fn test_install_then_build() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm")
            .returns_stdout("added 12 packages\n")
            .finish();

        let runner = BuildRunner::new(Arc::new(mock.clone()), Duration::from_secs(120));
        let report = runner
            .install_and_build(Path::new("/ws"), &npm_build())
            .await
            .unwrap();

        assert_eq!(report.commands, vec!["npm install", "npm run build"]);
        let calls = mock.get_call_history();
        assert_eq!(calls[0].args, ["install"]);
        assert_eq!(calls[1].args, ["run", "build"]);
        assert_eq!(calls[1].timeout, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_build_failure_captures_output() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm")
            .with_args(|args| args == ["install"])
            .finish();
        mock.expect_command("npm")
            .with_args(|args| args == ["run", "build"])
            .returns_exit_code(2)
            .returns_stderr("src/index.ts(3,1): error TS2304: Cannot find name 'x'.")
            .finish();

        let runner = BuildRunner::new(Arc::new(mock), Duration::from_secs(120));
        let err = runner
            .install_and_build(Path::new("/ws"), &npm_build())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::BuildFailed);
        assert!(err.user_message().contains("error TS2304"));
        assert!(err.user_message().contains("exitCode: 2"));
    }

    #[tokio::test]
    async fn test_build_only_skips_install() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();

        let runner = BuildRunner::new(Arc::new(mock.clone()), Duration::from_secs(1));
        runner.build_only(Path::new("/ws"), &npm_build()).await.unwrap();
        assert_eq!(mock.get_call_history().len(), 1);
        assert_eq!(mock.get_call_history()[0].args, ["run", "build"]);
    }

    #[tokio::test]
    async fn test_missing_tool_is_build_failure() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").returns_not_found().finish();

        let runner = BuildRunner::new(Arc::new(mock), Duration::from_secs(1));
        let err = runner
            .install_and_build(Path::new("/ws"), &npm_build())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BuildFailed);
    }
}
