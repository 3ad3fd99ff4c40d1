//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use pth::config::HarnessConfig;
use pth::git::GitClient;
use pth::plugin::NixProcessControl;
use pth::session::SessionManager;
use pth::subprocess::TokioProcessRunner;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Builder for a temporary plugin repository
pub struct TestContextBuilder {
    temp_dir: TempDir,
    mcp_plugin: Option<String>,
    initial_files: Vec<(PathBuf, String)>,
}

impl TestContextBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            mcp_plugin: None,
            initial_files: Vec::new(),
        })
    }

    /// Commit `.mcp.json` and `package.json` for a tool-server plugin
    pub fn with_mcp_plugin(mut self, name: &str) -> Self {
        self.mcp_plugin = Some(name.to_string());
        self
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        self.initial_files
            .push((path.as_ref().to_path_buf(), content.to_string()));
        self
    }

    pub fn build(self) -> Result<TestContext> {
        let path = self.temp_dir.path();
        git(path, &["init", "-q"])?;
        git(path, &["config", "user.email", "test@example.com"])?;
        git(path, &["config", "user.name", "Test User"])?;
        git(path, &["config", "commit.gpgsign", "false"])?;
        fs::write(path.join("README.md"), "# Test Repo\n")?;

        if let Some(name) = &self.mcp_plugin {
            fs::write(
                path.join(".mcp.json"),
                format!(r#"{{"mcpServers":{{"{name}":{{"command":"node","args":["dist/index.js"]}}}}}}"#),
            )?;
            fs::write(
                path.join("package.json"),
                format!(r#"{{"name":"{name}","main":"dist/index.js"}}"#),
            )?;
        }
        for (file_path, content) in self.initial_files {
            let full_path = path.join(file_path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full_path, content)?;
        }
        git(path, &["add", "."])?;
        git(path, &["commit", "-q", "-m", "Initial commit"])?;

        Ok(TestContext {
            temp_dir: self.temp_dir,
            workspaces: TempDir::new()?,
        })
    }
}

/// A plugin repository plus a private workspace base directory
pub struct TestContext {
    temp_dir: TempDir,
    workspaces: TempDir,
}

impl TestContext {
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn workspace_base(&self) -> &Path {
        self.workspaces.path()
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            worktree_dir: self.workspaces.path().to_path_buf(),
            cache_dir: self.workspaces.path().join("cache"),
            ..HarnessConfig::default()
        }
    }

    /// A manager wired to real git and real process liveness
    pub fn manager(&self) -> SessionManager {
        SessionManager::new(
            self.config(),
            Arc::new(TokioProcessRunner),
            Arc::new(NixProcessControl),
        )
    }

    pub fn git_output(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new("git").current_dir(dir).args(args).output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn git_client() -> GitClient {
    GitClient::new(Arc::new(TokioProcessRunner), Duration::from_secs(30))
}

pub fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git").current_dir(dir).args(args).output()?;
    anyhow::ensure!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

/// A pid that is not running: a child that has already been reaped.
pub fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("wait for true");
    pid
}
