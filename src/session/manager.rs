//! Session lifecycle: preflight, start, resume and end.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::fix::{get_fix_history, SESSION_DIR, SESSION_END_TYPE, TRAILER_TYPE};
use crate::git::{build_commit_message, GitClient};
use crate::plugin::{detect_build_system, detect_plugin, ProcessControl};
use crate::results::ResultsTracker;
use crate::subprocess::ProcessRunner;
use crate::suite::{generator::TOOLS_CACHE_FILE, load_tests_from_dir, TestStore};
use crate::worktree::{generate_session_branch, WorkspaceController};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::active::ActiveSession;
use super::lock::{LockManager, LockStatus, SessionLock};
use super::persistence::{read_state, tests_dir, write_state};
use super::report::{render_report, write_report};
use super::state::{SessionId, SessionState};

const BRANCH_ATTEMPTS: usize = 5;
const REPORTS_DIR: &str = "reports";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckLevel {
    Ok,
    Warn,
    Fail,
}

impl CheckLevel {
    fn icon(&self) -> char {
        match self {
            CheckLevel::Ok => '✓',
            CheckLevel::Warn => '⚠',
            CheckLevel::Fail => '✗',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightCheck {
    pub level: CheckLevel,
    pub message: String,
}

/// Read-only diagnosis of whether a session can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub plugin_path: PathBuf,
    pub checks: Vec<PreflightCheck>,
}

impl PreflightReport {
    fn push(&mut self, level: CheckLevel, message: impl Into<String>) {
        self.checks.push(PreflightCheck {
            level,
            message: message.into(),
        });
    }

    pub fn ready(&self) -> bool {
        self.checks.iter().all(|c| c.level != CheckLevel::Fail)
    }

    pub fn render(&self) -> String {
        let mut lines = vec!["PTH Preflight Check".to_string(), String::new()];
        for check in &self.checks {
            lines.push(format!("{} {}", check.level.icon(), check.message));
        }
        lines.push(String::new());
        lines.push(if self.ready() {
            "OK: ready to start a session.".to_string()
        } else {
            "Not ready: resolve the problems above first.".to_string()
        });
        lines.join("\n")
    }
}

/// What [`SessionManager::end`] left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOutcome {
    pub branch: String,
    /// Copy of the report outside the removed workspace.
    pub report_path: PathBuf,
    pub tests_saved: usize,
    pub iterations: u32,
    pub passing: usize,
    pub failing: usize,
    /// Short hash of the commit holding the session artefacts, if one was made.
    pub end_commit: Option<String>,
}

impl EndOutcome {
    pub fn summary(&self) -> String {
        [
            "PTH session ended.".to_string(),
            String::new(),
            format!("Branch:       {}", self.branch),
            format!("Tests saved:  {}", self.tests_saved),
            format!("Iterations:   {}", self.iterations),
            format!("Final status: {} passing, {} failing", self.passing, self.failing),
            format!("Report:       {}", self.report_path.display()),
            String::new(),
            format!(
                "Branch {} remains in your repo with full session history.",
                self.branch
            ),
            format!("Review: git log {}", self.branch),
        ]
        .join("\n")
    }
}

pub struct SessionManager {
    config: HarnessConfig,
    git: GitClient,
    workspaces: WorkspaceController,
    locks: LockManager,
}

impl SessionManager {
    pub fn new(
        config: HarnessConfig,
        runner: Arc<dyn ProcessRunner>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        let git = GitClient::new(runner, config.git_timeout());
        let workspaces = WorkspaceController::new(config.worktree_dir.clone(), git.clone());
        Self {
            git,
            workspaces,
            locks: LockManager::new(control),
            config,
        }
    }

    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn git(&self) -> &GitClient {
        &self.git
    }

    pub fn workspaces(&self) -> &WorkspaceController {
        &self.workspaces
    }

    pub fn lock_status(&self, plugin_path: &Path) -> Result<LockStatus> {
        self.locks.inspect(plugin_path)
    }

    pub async fn preflight(&self, plugin_path: &Path) -> PreflightReport {
        let mut report = PreflightReport {
            plugin_path: plugin_path.to_path_buf(),
            checks: Vec::new(),
        };

        if !plugin_path.is_dir() {
            report.push(
                CheckLevel::Fail,
                format!("Plugin path not found: {}", plugin_path.display()),
            );
            return report;
        }
        report.push(
            CheckLevel::Ok,
            format!("Plugin path exists: {}", plugin_path.display()),
        );

        match self.git.is_repository(plugin_path).await {
            Ok(true) => report.push(CheckLevel::Ok, "Git repository detected"),
            Ok(false) => report.push(
                CheckLevel::Fail,
                "Not a git repository: sessions need git for branch and workspace management",
            ),
            Err(e) => report.push(CheckLevel::Fail, format!("Could not run git: {e}")),
        }

        match detect_plugin(plugin_path) {
            Ok(info) => {
                report.push(CheckLevel::Ok, format!("Plugin: {} ({} mode)", info.name, info.mode));
                report.push(CheckLevel::Ok, format!("Build system: {}", info.build.describe()));
            }
            Err(e) => report.push(CheckLevel::Fail, e.to_string()),
        }

        match self.locks.inspect(plugin_path) {
            Ok(LockStatus::Free) => report.push(CheckLevel::Ok, "No active session lock"),
            Ok(LockStatus::Held(record)) => report.push(
                CheckLevel::Fail,
                format!(
                    "Active session detected (PID {}, branch {}); resume it or end it first",
                    record.pid, record.branch
                ),
            ),
            Ok(LockStatus::Stale(record)) => report.push(
                CheckLevel::Warn,
                format!(
                    "Stale session lock (PID {} is not running, branch {}); it will be recovered at start",
                    record.pid, record.branch
                ),
            ),
            Ok(LockStatus::Unreadable(reason)) => report.push(
                CheckLevel::Warn,
                format!("Unreadable session lock ({reason}); it will be replaced at start"),
            ),
            Err(e) => report.push(CheckLevel::Warn, format!("Could not read session lock: {e}")),
        }

        report
    }

    /// Lock, create a workspace and write the initial state. Any failure
    /// after the lock is taken rolls back everything created so far.
    pub async fn start(&self, plugin_path: &Path, note: Option<String>) -> Result<ActiveSession> {
        let info = detect_plugin(plugin_path)?;
        let repo_root = self.resolve_repo_root(plugin_path).await?;
        let plugin_rel_path = relative_plugin_path(&repo_root, plugin_path)?;
        let branch = self.unused_branch(&repo_root, &info.name).await?;

        let lock = self.locks.acquire(plugin_path, &branch)?;
        let workspace = match self.workspaces.create_workspace(&repo_root, &branch).await {
            Ok(path) => path,
            Err(e) => {
                self.release_quietly(&lock);
                return Err(e);
            }
        };

        let init = async {
            let workspace_plugin = join_rel(&workspace, &plugin_rel_path);
            if !workspace_plugin.is_dir() {
                return Err(HarnessError::InvalidPlugin(format!(
                    "plugin directory {plugin_rel_path:?} is not committed on HEAD"
                )));
            }
            let base_commit = self.git.head_commit(&workspace).await?;
            let tests = load_store(&workspace)?;
            let state = SessionState {
                session_id: SessionId::new(),
                branch: branch.clone(),
                worktree_path: workspace.clone(),
                plugin_path: plugin_path.to_path_buf(),
                plugin_name: info.name.clone(),
                plugin_mode: info.mode,
                plugin_rel_path: plugin_rel_path.clone(),
                started_at: Utc::now(),
                iteration: 0,
                test_count: tests.count(),
                passing_count: 0,
                failing_count: 0,
                convergence_trend: Default::default(),
                active_failures: Vec::new(),
                session_note: note.clone(),
                base_commit: Some(base_commit),
                iteration_history: Default::default(),
                fixes_this_iteration: 0,
            };
            write_state(&workspace, &state)?;
            Ok::<_, HarnessError>((state, tests, detect_build_system(&workspace_plugin)))
        }
        .await;

        match init {
            Ok((state, tests, build)) => {
                tracing::info!(
                    branch = %branch,
                    workspace = %workspace.display(),
                    tests = tests.count(),
                    "Started session"
                );
                Ok(ActiveSession {
                    state,
                    tests,
                    results: ResultsTracker::new(),
                    build,
                    state_reconstructed: false,
                    dependencies_installed: false,
                    lock,
                    repo_root,
                    history_window: self.config.history_window,
                })
            }
            Err(e) => {
                tracing::warn!(branch = %branch, "Session start failed, rolling back: {}", e);
                if let Err(cleanup) = self
                    .workspaces
                    .destroy_workspace(&repo_root, &workspace)
                    .await
                {
                    tracing::warn!("Failed to remove workspace during rollback: {}", cleanup);
                }
                if let Err(cleanup) = self.git.delete_branch(&repo_root, &branch).await {
                    tracing::warn!("Failed to delete branch during rollback: {}", cleanup);
                }
                self.release_quietly(&lock);
                Err(e)
            }
        }
    }

    /// Reattach to an existing session branch. Counters are kept; when the
    /// state file is missing it is rebuilt from the fix log.
    pub async fn resume(&self, plugin_path: &Path, branch: &str) -> Result<ActiveSession> {
        let info = detect_plugin(plugin_path)?;
        let repo_root = self.resolve_repo_root(plugin_path).await?;
        let plugin_rel_path = relative_plugin_path(&repo_root, plugin_path)?;

        let lock = self.locks.acquire(plugin_path, branch)?;
        let workspace = match self.workspaces.reattach_workspace(&repo_root, branch).await {
            Ok(path) => path,
            Err(e) => {
                self.release_quietly(&lock);
                return Err(e);
            }
        };

        let restored = async {
            let (mut state, reconstructed) = match read_state(&workspace)? {
                Some(state) => (state, false),
                None => (
                    self.reconstruct_state(&workspace, branch, plugin_path, &info.name, info.mode)
                        .await?,
                    true,
                ),
            };
            state.branch = branch.to_string();
            state.worktree_path = workspace.clone();
            state.plugin_path = plugin_path.to_path_buf();
            state.plugin_rel_path = plugin_rel_path.clone();

            let tests = load_store(&workspace)?;
            if state.set_test_count(tests.count()).is_err() {
                tracing::warn!(
                    tests = tests.count(),
                    "Persisted counts exceed loaded tests, resetting counts"
                );
                state.set_counts(tests.count(), 0, 0)?;
                state.active_failures.clear();
            }
            write_state(&workspace, &state)?;
            let build = detect_build_system(&state.workspace_plugin_path());
            Ok::<_, HarnessError>((state, tests, build, reconstructed))
        }
        .await;

        match restored {
            Ok((state, tests, build, reconstructed)) => {
                tracing::info!(
                    branch = %branch,
                    iteration = state.iteration,
                    reconstructed,
                    "Resumed session"
                );
                Ok(ActiveSession {
                    state,
                    tests,
                    results: ResultsTracker::new(),
                    build,
                    state_reconstructed: reconstructed,
                    dependencies_installed: false,
                    lock,
                    repo_root,
                    history_window: self.config.history_window,
                })
            }
            Err(e) => {
                self.release_quietly(&lock);
                Err(e)
            }
        }
    }

    async fn reconstruct_state(
        &self,
        workspace: &Path,
        branch: &str,
        plugin_path: &Path,
        plugin_name: &str,
        plugin_mode: crate::plugin::PluginMode,
    ) -> Result<SessionState> {
        let fixes = get_fix_history(&self.git, workspace, self.config.max_log_records).await?;
        let iteration = fixes.iter().filter_map(|f| f.iteration()).max().unwrap_or(0);
        let base_commit = match fixes.last() {
            Some(oldest) => self
                .git
                .rev_parse(workspace, &format!("{}^", oldest.commit_hash))
                .await
                .ok(),
            None => self.git.head_commit(workspace).await.ok(),
        };
        tracing::warn!(
            branch = %branch,
            fixes = fixes.len(),
            iteration,
            "No session state found, reconstructed from fix history"
        );
        Ok(SessionState {
            session_id: SessionId::new(),
            branch: branch.to_string(),
            worktree_path: workspace.to_path_buf(),
            plugin_path: plugin_path.to_path_buf(),
            plugin_name: plugin_name.to_string(),
            plugin_mode,
            plugin_rel_path: String::new(),
            started_at: Utc::now(),
            iteration,
            test_count: 0,
            passing_count: 0,
            failing_count: 0,
            convergence_trend: Default::default(),
            active_failures: Vec::new(),
            session_note: None,
            base_commit,
            iteration_history: Default::default(),
            fixes_this_iteration: 0,
        })
    }

    /// Persist tests, write the report, commit session artefacts, remove the
    /// workspace and release the lock. On error the session stays usable:
    /// nothing is removed until the artefacts are committed on the branch.
    pub async fn end(&self, session: &mut ActiveSession) -> Result<EndOutcome> {
        session.persist_tests()?;

        let workspace = session.workspace().to_path_buf();
        let report = render_report(&session.state, &session.results.all_latest(), Utc::now());
        write_report(&workspace, &report)?;
        session.persist_state()?;

        let end_commit = self.commit_session_artifacts(&workspace).await?;

        let reports_dir = session.state.plugin_path.join(SESSION_DIR).join(REPORTS_DIR);
        let report_name = format!("{}.md", session.state.branch.replace('/', "-"));
        let report_path = reports_dir.join(report_name);
        crate::storage::write_atomic(&report_path, report.as_bytes())?;

        self.workspaces
            .destroy_workspace(&session.repo_root, &workspace)
            .await?;
        self.locks.release(&session.lock)?;

        tracing::info!(branch = %session.state.branch, "Ended session");
        Ok(EndOutcome {
            branch: session.state.branch.clone(),
            report_path,
            tests_saved: session.tests.count(),
            iterations: session.state.iteration,
            passing: session.state.passing_count,
            failing: session.state.failing_count,
            end_commit,
        })
    }

    /// Commit `.pth` (staged with `-f` so a gitignore cannot drop it) and
    /// the tools cache. `None` when nothing changed since the last commit.
    async fn commit_session_artifacts(&self, workspace: &Path) -> Result<Option<String>> {
        let mut paths = vec![SESSION_DIR.to_string()];
        if workspace.join(TOOLS_CACHE_FILE).exists() {
            paths.push(TOOLS_CACHE_FILE.to_string());
        }
        self.git.stage_paths(workspace, &paths, true).await?;
        if !self.git.has_staged_changes(workspace, &paths).await? {
            tracing::debug!("Session artifacts unchanged, nothing to commit");
            return Ok(None);
        }

        let mut trailers = BTreeMap::new();
        trailers.insert(TRAILER_TYPE.to_string(), SESSION_END_TYPE.to_string());
        let message = build_commit_message("chore: persist PTH session artifacts", &trailers);
        self.git.commit_staged(workspace, &message, &paths).await?;
        self.git.short_head(workspace).await.map(Some)
    }

    async fn resolve_repo_root(&self, plugin_path: &Path) -> Result<PathBuf> {
        if !self.git.is_repository(plugin_path).await? {
            return Err(HarnessError::git(
                "rev-parse",
                format!("{} is not inside a git repository", plugin_path.display()),
                None,
                "",
            ));
        }
        self.git.repo_root(plugin_path).await
    }

    async fn unused_branch(&self, repo_root: &Path, plugin_name: &str) -> Result<String> {
        for _ in 0..BRANCH_ATTEMPTS {
            let branch = generate_session_branch(&self.config.branch_prefix, plugin_name);
            if !self.git.branch_exists(repo_root, &branch).await? {
                return Ok(branch);
            }
            tracing::debug!(branch = %branch, "Generated branch exists, retrying");
        }
        Err(HarnessError::git(
            "branch",
            format!("could not generate an unused session branch after {BRANCH_ATTEMPTS} attempts"),
            None,
            "",
        ))
    }

    fn release_quietly(&self, lock: &SessionLock) {
        if let Err(e) = self.locks.release(lock) {
            tracing::warn!("Failed to release session lock: {}", e);
        }
    }
}

fn load_store(workspace: &Path) -> Result<TestStore> {
    let mut store = TestStore::new();
    for test in load_tests_from_dir(&tests_dir(workspace))? {
        store.add(test)?;
    }
    Ok(store)
}

fn join_rel(root: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

/// Plugin directory relative to the repository root, `/`-separated.
pub fn relative_plugin_path(repo_root: &Path, plugin_path: &Path) -> Result<String> {
    let canonical = |p: &Path| {
        fs::canonicalize(p).map_err(|e| HarnessError::storage(p, "failed to resolve path", e))
    };
    let root = canonical(repo_root)?;
    let plugin = canonical(plugin_path)?;
    let relative = plugin.strip_prefix(&root).map_err(|_| {
        HarnessError::InvalidPlugin(format!(
            "{} is outside repository {}",
            plugin_path.display(),
            repo_root.display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}
