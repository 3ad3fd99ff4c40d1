//! Typed wrapper over the `git` binary.
//!
//! Every call goes through [`ProcessRunner`] with the configured timeout. A
//! non-zero exit becomes [`HarnessError::Git`] carrying verbatim stderr; a
//! timeout stays [`HarnessError::Timeout`].

pub mod parsers;

pub use parsers::{
    build_commit_message, is_commit_hash, parse_log_records, parse_trailers, parse_worktree_list,
    LogRecord, WorktreeEntry,
};

use crate::error::{HarnessError, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessOutput, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl GitClient {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Run git and return its output regardless of exit status.
    pub async fn run(&self, dir: &Path, args: &[&str]) -> Result<ProcessOutput> {
        let command = ProcessCommandBuilder::new("git")
            .args(args)
            .current_dir(dir)
            .timeout(self.timeout)
            .build();

        self.runner.run(command).await.map_err(|e| match e {
            ProcessError::CommandNotFound(_) => HarnessError::git(
                args.first().copied().unwrap_or("invoke"),
                "git executable not found on PATH",
                None,
                "",
            ),
            other => other.into(),
        })
    }

    /// Run git and fail with `GIT_ERROR` on a non-zero exit.
    pub async fn run_checked(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(dir, args).await?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let operation = args.first().copied().unwrap_or("invoke");
        let message = match output.status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(HarnessError::git(
            operation,
            message,
            output.status.code(),
            output.stderr,
        ))
    }

    pub async fn is_repository(&self, path: &Path) -> Result<bool> {
        let output = self.run(path, &["rev-parse", "--git-dir"]).await?;
        Ok(output.status.success())
    }

    pub async fn repo_root(&self, path: &Path) -> Result<PathBuf> {
        let stdout = self
            .run_checked(path, &["rev-parse", "--show-toplevel"])
            .await?;
        Ok(PathBuf::from(stdout.trim()))
    }

    pub async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self
            .run(repo, &["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.status.success())
    }

    pub async fn head_commit(&self, dir: &Path) -> Result<String> {
        let stdout = self.run_checked(dir, &["rev-parse", "HEAD"]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Full hash of any revision expression.
    pub async fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String> {
        let stdout = self
            .run_checked(dir, &["rev-parse", "--verify", rev])
            .await?;
        Ok(stdout.trim().to_string())
    }

    pub async fn short_head(&self, dir: &Path) -> Result<String> {
        let stdout = self
            .run_checked(dir, &["rev-parse", "--short", "HEAD"])
            .await?;
        Ok(stdout.trim().to_string())
    }

    /// `git worktree add -b <branch> <path> HEAD`
    pub async fn add_worktree_new_branch(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(repo, &["worktree", "add", "-b", branch, &path_str, "HEAD"])
            .await?;
        Ok(())
    }

    /// Check out an existing branch into a new linked worktree.
    pub async fn add_worktree(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(repo, &["worktree", "add", &path_str, branch])
            .await?;
        Ok(())
    }

    pub async fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeEntry>> {
        let stdout = self
            .run_checked(repo, &["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_worktree_list(&stdout))
    }

    pub async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(repo, &["worktree", "remove", "--force", &path_str])
            .await?;
        Ok(())
    }

    pub async fn delete_branch(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run_checked(repo, &["branch", "-D", branch]).await?;
        Ok(())
    }

    pub async fn prune_worktrees(&self, repo: &Path) -> Result<()> {
        self.run_checked(repo, &["worktree", "prune"]).await?;
        Ok(())
    }

    /// Stage exactly `files` and commit them, leaving anything else untouched.
    pub async fn commit_paths(&self, dir: &Path, message: &str, files: &[String]) -> Result<()> {
        self.stage_paths(dir, files, false).await?;
        self.commit_staged(dir, message, files).await
    }

    /// `git add [-f] -- <files>`. `force` stages ignored paths too.
    pub async fn stage_paths(&self, dir: &Path, files: &[String], force: bool) -> Result<()> {
        let mut args = vec!["add"];
        if force {
            args.push("-f");
        }
        args.push("--");
        args.extend(files.iter().map(String::as_str));
        self.run_checked(dir, &args).await?;
        Ok(())
    }

    /// Whether the index differs from HEAD under `files`.
    pub async fn has_staged_changes(&self, dir: &Path, files: &[String]) -> Result<bool> {
        let mut args = vec!["diff", "--cached", "--quiet", "--"];
        args.extend(files.iter().map(String::as_str));
        let output = self.run(dir, &args).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => Err(HarnessError::git(
                "diff",
                "could not inspect staged changes",
                code,
                output.stderr,
            )),
        }
    }

    /// Commit the staged state of `files` only.
    pub async fn commit_staged(&self, dir: &Path, message: &str, files: &[String]) -> Result<()> {
        let mut args = vec!["commit", "-m", message, "--"];
        args.extend(files.iter().map(String::as_str));
        self.run_checked(dir, &args).await?;
        Ok(())
    }

    /// Raw log text in [`parsers::LOG_FORMAT`], newest first.
    pub async fn log(&self, dir: &Path, max_count: usize) -> Result<String> {
        self.log_since(dir, None, max_count).await
    }

    /// Like [`GitClient::log`], limited to commits after `base` when given.
    pub async fn log_since(
        &self,
        dir: &Path,
        base: Option<&str>,
        max_count: usize,
    ) -> Result<String> {
        let limit = format!("-n{max_count}");
        let mut args = vec!["log", parsers::LOG_FORMAT, limit.as_str()];
        let range = base.map(|base| format!("{base}..HEAD"));
        if let Some(range) = range.as_deref() {
            args.push(range);
        }
        self.run_checked(dir, &args).await
    }

    pub async fn commit_subject(&self, dir: &Path, hash: &str) -> Result<String> {
        let stdout = self
            .run_checked(dir, &["show", "-s", "--format=%s", hash])
            .await?;
        Ok(stdout.trim().to_string())
    }

    /// Create a compensating commit. A conflicting revert is aborted so the
    /// workspace is left as it was.
    pub async fn revert(&self, dir: &Path, hash: &str) -> Result<()> {
        match self.run_checked(dir, &["revert", "--no-edit", hash]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Err(abort_err) = self.run_checked(dir, &["revert", "--abort"]).await {
                    tracing::debug!("git revert --abort after failed revert: {}", abort_err);
                }
                Err(err)
            }
        }
    }

    /// Committed changes between `base` and HEAD, excluding `exclude`.
    pub async fn diff(&self, dir: &Path, base: &str, exclude: &str) -> Result<String> {
        let pathspec = format!(":(exclude){exclude}");
        self.run_checked(dir, &["diff", base, "HEAD", "--", ".", &pathspec])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::subprocess::MockProcessRunner;

    fn client(mock: &MockProcessRunner) -> GitClient {
        GitClient::new(Arc::new(mock.clone()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_run_checked_surfaces_stderr() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|args| args[0] == "rev-parse")
            .returns_exit_code(128)
            .returns_stderr("fatal: not a git repository")
            .finish();

        let err = client(&mock)
            .repo_root(Path::new("/tmp"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GitError);
        assert!(err.user_message().contains("fatal: not a git repository"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .returns_timeout(Duration::from_secs(5))
            .finish();

        let err = client(&mock)
            .log(Path::new("/tmp"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_commit_paths_stages_only_named_files() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git").returns_success().finish();

        let files = vec!["src/index.ts".to_string(), "README.md".to_string()];
        client(&mock)
            .commit_paths(Path::new("/tmp/ws"), "fix: x", &files)
            .await
            .unwrap();

        let calls = mock.get_call_history();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, ["add", "--", "src/index.ts", "README.md"]);
        assert_eq!(
            calls[1].args,
            ["commit", "-m", "fix: x", "--", "src/index.ts", "README.md"]
        );
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_forced_staging_then_staged_change_check() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_arg_prefix(&["diff", "--cached"])
            .returns_exit_code(1)
            .finish();
        mock.expect_command("git").returns_success().finish();

        let git = client(&mock);
        let paths = vec![".pth".to_string()];
        git.stage_paths(Path::new("/ws"), &paths, true).await.unwrap();
        assert!(git.has_staged_changes(Path::new("/ws"), &paths).await.unwrap());

        let calls = mock.get_call_history();
        assert_eq!(calls[0].args, ["add", "-f", "--", ".pth"]);
        assert_eq!(calls[1].args, ["diff", "--cached", "--quiet", "--", ".pth"]);
    }

    #[tokio::test]
    async fn test_failed_revert_is_aborted() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_arg_prefix(&["revert", "--no-edit"])
            .returns_exit_code(1)
            .returns_stderr("error: could not revert abc1234")
            .finish();
        mock.expect_command("git")
            .with_args(|args| args == ["revert", "--abort"])
            .returns_success()
            .finish();

        let result = client(&mock).revert(Path::new("/tmp/ws"), "abc1234").await;
        assert!(result.is_err());
        assert_eq!(mock.get_call_history().len(), 2);
    }

    #[tokio::test]
    async fn test_branch_exists_uses_exit_code() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|args| args.last().map(String::as_str) == Some("refs/heads/pth/a"))
            .returns_success()
            .finish();
        mock.expect_command("git").returns_exit_code(1).finish();

        let git = client(&mock);
        assert!(git.branch_exists(Path::new("/r"), "pth/a").await.unwrap());
        assert!(!git.branch_exists(Path::new("/r"), "pth/b").await.unwrap());
    }
}
