use super::*;
use crate::config::HarnessConfig;
use crate::error::ErrorCode;
use crate::results::TestStatus;
use crate::subprocess::TokioProcessRunner;
use crate::suite::{PthTest, TestMode, TestType};
use crate::testing::{commit_file, git, init_git_repo, init_mcp_plugin_repo, FakeProcessControl};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ME: u32 = 4242;

struct Fixture {
    repo: TempDir,
    _workspaces: TempDir,
    control: FakeProcessControl,
    manager: SessionManager,
}

fn fixture() -> Fixture {
    let repo = init_mcp_plugin_repo("demo");
    let workspaces = TempDir::new().unwrap();
    let control = FakeProcessControl::with_alive(&[ME]);
    let manager = manager_for(workspaces.path(), &control, ME);
    Fixture {
        repo,
        _workspaces: workspaces,
        control,
        manager,
    }
}

fn manager_for(base: &Path, control: &FakeProcessControl, pid: u32) -> SessionManager {
    let config = HarnessConfig {
        worktree_dir: base.to_path_buf(),
        ..HarnessConfig::default()
    };
    let control: Arc<FakeProcessControl> = Arc::new(control.clone());
    SessionManager::new(config, Arc::new(TokioProcessRunner), control.clone())
        .with_lock_manager(LockManager::with_pid(control, pid))
}

fn list_tools_test() -> PthTest {
    let mut test = PthTest::new("list_tools", "list tools", TestMode::Mcp, TestType::Single);
    test.tool = Some("list".to_string());
    test
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[tokio::test]
async fn test_start_creates_workspace_state_and_lock() {
    let fx = fixture();
    let session = fx
        .manager
        .start(fx.repo.path(), Some("first pass".to_string()))
        .await
        .unwrap();

    assert!(session.workspace().is_dir());
    assert!(session.state.branch.starts_with("pth/demo-"));
    assert_eq!(session.state.iteration, 0);
    assert_eq!(session.state.plugin_rel_path, "");
    assert_eq!(session.state.session_note.as_deref(), Some("first pass"));
    assert!(session.state.base_commit.is_some());

    let persisted = read_state(session.workspace()).unwrap().unwrap();
    assert_eq!(persisted.branch, session.state.branch);

    match fx.manager.lock_status(fx.repo.path()).unwrap() {
        LockStatus::Held(record) => {
            assert_eq!(record.pid, ME);
            assert_eq!(record.branch, session.state.branch);
        }
        other => panic!("expected held lock, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_start_is_rejected_while_holder_lives() {
    let fx = fixture();
    let first = fx.manager.start(fx.repo.path(), None).await.unwrap();

    let other_base = TempDir::new().unwrap();
    let other = manager_for(other_base.path(), &fx.control, 5151);
    let err = other.start(fx.repo.path(), None).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::SessionAlreadyActive);
    assert!(err.user_message().contains(&first.state.branch));
}

#[tokio::test]
async fn test_start_recovers_stale_lock() {
    let fx = fixture();
    let dead = LockManager::with_pid(Arc::new(fx.control.clone()), 9999);
    dead.acquire(fx.repo.path(), "pth/abandoned").unwrap();

    let session = fx.manager.start(fx.repo.path(), None).await.unwrap();
    assert_ne!(session.state.branch, "pth/abandoned");
}

#[tokio::test]
async fn test_start_outside_repository_fails_without_lock() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".mcp.json"), r#"{"mcpServers":{"x":{"command":"node"}}}"#)
        .unwrap();
    let fx = fixture();

    let err = fx.manager.start(dir.path(), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GitError);
    assert!(!lock_path(dir.path()).exists());
}

#[tokio::test]
async fn test_start_missing_path_is_plugin_not_found() {
    let fx = fixture();
    let err = fx
        .manager
        .start(Path::new("/definitely/not/here"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PluginNotFound);
}

#[tokio::test]
async fn test_end_commits_artifacts_and_keeps_branch() {
    let fx = fixture();
    let mut session = fx.manager.start(fx.repo.path(), None).await.unwrap();
    session.tests.add(list_tools_test()).unwrap();
    session
        .record_result(ResultReport::new("list_tools", TestStatus::Passing))
        .unwrap();
    session.complete_iteration().unwrap();
    let workspace = session.workspace().to_path_buf();

    let outcome = fx.manager.end(&mut session).await.unwrap();

    assert!(!workspace.exists());
    assert_eq!(outcome.tests_saved, 1);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.passing, 1);
    assert!(outcome.end_commit.is_some());
    assert!(outcome.report_path.is_file());
    assert!(outcome.summary().contains(&outcome.branch));
    assert!(!lock_path(fx.repo.path()).exists());

    let body = git_stdout(fx.repo.path(), &["log", "-1", "--format=%B", &outcome.branch]);
    assert!(body.contains("PTH-Type: session-end"));
    let files = git_stdout(
        fx.repo.path(),
        &["ls-tree", "-r", "--name-only", &outcome.branch],
    );
    assert!(files.contains(".pth/tests/mcp-tests.yaml"));
    assert!(files.contains(".pth/session-state.json"));
    assert!(files.contains(".pth/SESSION-REPORT.md"));
}

#[tokio::test]
async fn test_resume_restores_counters_and_tests() {
    let fx = fixture();
    let mut session = fx.manager.start(fx.repo.path(), None).await.unwrap();
    session.tests.add(list_tools_test()).unwrap();
    session
        .record_result(ResultReport::new("list_tools", TestStatus::Failing))
        .unwrap();
    session.complete_iteration().unwrap();
    let outcome = fx.manager.end(&mut session).await.unwrap();

    let resumed = fx
        .manager
        .resume(fx.repo.path(), &outcome.branch)
        .await
        .unwrap();

    assert!(!resumed.state_reconstructed);
    assert_eq!(resumed.state.iteration, 1);
    assert_eq!(resumed.state.iteration_history.len(), 1);
    assert_eq!(resumed.tests.count(), 1);
    assert!(resumed.results.is_empty());
    assert!(resumed.workspace().is_dir());
}

#[tokio::test]
async fn test_resume_without_state_reconstructs_from_fix_log() {
    let fx = fixture();
    let repo = fx.repo.path();
    git(repo, &["checkout", "-q", "-b", "pth/demo-manual"]);
    std::fs::write(repo.join("index.js"), "one").unwrap();
    git(repo, &["add", "index.js"]);
    git(
        repo,
        &["commit", "-q", "-m", "fix: first\n\nPTH-Iteration: 1\nPTH-Type: fix"],
    );
    std::fs::write(repo.join("index.js"), "two").unwrap();
    git(repo, &["add", "index.js"]);
    git(
        repo,
        &["commit", "-q", "-m", "fix: second\n\nPTH-Iteration: 3\nPTH-Type: fix"],
    );
    git(repo, &["checkout", "-q", "-"]);

    let resumed = fx.manager.resume(repo, "pth/demo-manual").await.unwrap();

    assert!(resumed.state_reconstructed);
    assert_eq!(resumed.state.iteration, 3);
    assert_eq!(resumed.state.plugin_name, "demo");
    let add_plugin = git_stdout(repo, &["rev-parse", "HEAD"]);
    assert_eq!(resumed.state.base_commit.as_deref(), Some(add_plugin.trim()));
}

#[tokio::test]
async fn test_resume_unknown_branch_releases_lock() {
    let fx = fixture();
    let err = fx
        .manager
        .resume(fx.repo.path(), "pth/never-existed")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GitError);
    assert!(!lock_path(fx.repo.path()).exists());
}

#[tokio::test]
async fn test_preflight_reports_readiness() {
    let fx = fixture();
    let report = fx.manager.preflight(fx.repo.path()).await;
    assert!(report.ready(), "{}", report.render());
    assert!(report.render().contains("Plugin: demo (mcp mode)"));

    let _session = fx.manager.start(fx.repo.path(), None).await.unwrap();
    let report = fx.manager.preflight(fx.repo.path()).await;
    assert!(!report.ready());
    assert!(report.render().contains("Active session detected"));
}

#[tokio::test]
async fn test_preflight_on_missing_path_stops_early() {
    let fx = fixture();
    let report = fx.manager.preflight(Path::new("/no/such/plugin")).await;
    assert!(!report.ready());
    assert_eq!(report.checks.len(), 1);
}

#[tokio::test]
async fn test_preflight_warns_on_plain_directory() {
    let repo = init_git_repo();
    commit_file(repo.path(), "notes.txt", "hi", "notes");
    let fx = fixture();
    let report = fx.manager.preflight(repo.path()).await;
    assert!(!report.ready());
    assert!(report
        .checks
        .iter()
        .any(|c| c.level == CheckLevel::Fail && c.message.contains(".mcp.json")));
}

#[tokio::test]
async fn test_iteration_without_results_takes_no_snapshot() {
    let fx = fixture();
    let mut session = fx.manager.start(fx.repo.path(), None).await.unwrap();
    session.tests.add(list_tools_test()).unwrap();
    session
        .record_result(ResultReport::new("list_tools", TestStatus::Passing))
        .unwrap();
    assert!(session.complete_iteration().unwrap().is_some());
    let outcome = fx.manager.end(&mut session).await.unwrap();

    let mut resumed = fx
        .manager
        .resume(fx.repo.path(), &outcome.branch)
        .await
        .unwrap();
    let trend = resumed.state.convergence_trend;
    assert!(resumed.complete_iteration().unwrap().is_none());

    assert_eq!(resumed.state.iteration, 2);
    assert_eq!(resumed.state.iteration_history.snapshots().len(), 1);
    assert_eq!(resumed.state.convergence_trend, trend);
    fx.manager.end(&mut resumed).await.unwrap();
}
