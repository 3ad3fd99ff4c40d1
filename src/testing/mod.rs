//! Fixtures shared by unit tests.

use crate::error::Result;
use crate::plugin::ProcessControl;
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("git must be installed for tests");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A git repository with a local identity and one commit containing README.md.
pub fn init_git_repo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test User"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.path().join("README.md"), "# Test Repo\n").expect("write README");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "Initial commit"]);
    dir
}

/// [`init_git_repo`] with a minimal MCP plugin committed at the root.
pub fn init_mcp_plugin_repo(name: &str) -> TempDir {
    let dir = init_git_repo();
    std::fs::write(
        dir.path().join(".mcp.json"),
        format!(r#"{{"mcpServers":{{"{name}":{{"command":"node","args":["dist/index.js"]}}}}}}"#),
    )
    .expect("write .mcp.json");
    std::fs::write(
        dir.path().join("package.json"),
        format!(r#"{{"name":"{name}","main":"dist/index.js"}}"#),
    )
    .expect("write package.json");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "Add plugin"]);
    dir
}

pub fn commit_file(dir: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(dir.join(file), content).expect("write file");
    git(dir, &["add", file]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Process table stand-in: a pid is alive until it is terminated or killed.
#[derive(Clone, Default)]
pub struct FakeProcessControl {
    alive: Arc<Mutex<HashSet<u32>>>,
    /// Pids that ignore SIGTERM.
    stubborn: Arc<Mutex<HashSet<u32>>>,
    signals: Arc<Mutex<Vec<(u32, &'static str)>>>,
}

impl FakeProcessControl {
    pub fn with_alive(pids: &[u32]) -> Self {
        let fake = Self::default();
        fake.alive.lock().unwrap().extend(pids.iter().copied());
        fake
    }

    pub fn ignore_sigterm(&self, pid: u32) {
        self.stubborn.lock().unwrap().insert(pid);
    }

    pub fn signals(&self) -> Vec<(u32, &'static str)> {
        self.signals.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        self.signals.lock().unwrap().push((pid, "TERM"));
        if !self.stubborn.lock().unwrap().contains(&pid) {
            self.alive.lock().unwrap().remove(&pid);
        }
        Ok(())
    }

    fn force_kill(&self, pid: u32) -> Result<()> {
        self.signals.lock().unwrap().push((pid, "KILL"));
        self.alive.lock().unwrap().remove(&pid);
        Ok(())
    }
}
