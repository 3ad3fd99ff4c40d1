use crate::error::{ErrorCode, HarnessError, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::build::BuildRunner;
use super::cache_sync::{CacheSync, SyncReport};
use super::detector::BuildSystem;
use super::process::{find_process, ProcessControl};

const TERM_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub build_succeeded: bool,
    pub build_output: String,
    pub sync: Option<SyncReport>,
    pub pid: Option<u32>,
    pub process_terminated: bool,
    /// Partial-success notes, e.g. `RELOAD_FAILED` when no process was found.
    pub notes: Vec<(ErrorCode, String)>,
}

impl ReloadOutcome {
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if !self.build_succeeded {
            lines.push("Build failed. Fix build errors before reloading.".to_string());
            return lines.join("\n");
        }
        lines.push("Build succeeded.".to_string());
        if let Some(sync) = &self.sync {
            let count = sync
                .files_transferred
                .map(|n| format!("{n} file(s) synced"))
                .unwrap_or_else(|| "files copied".to_string());
            lines.push(format!("Cache: {} ({count})", sync.destination.display()));
        }
        if let (true, Some(pid)) = (self.process_terminated, self.pid) {
            lines.push(format!(
                "Process {pid} terminated. The host should restart the plugin; call one of its tools to verify."
            ));
        }
        for (code, note) in &self.notes {
            lines.push(format!("[{code}] {note}"));
        }
        lines.join("\n")
    }
}

pub struct Reloader {
    build: BuildRunner,
    cache: CacheSync,
    runner: Arc<dyn ProcessRunner>,
    control: Arc<dyn ProcessControl>,
    grace: Duration,
    poll: Duration,
}

impl Reloader {
    pub fn new(
        build: BuildRunner,
        cache: CacheSync,
        runner: Arc<dyn ProcessRunner>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            build,
            cache,
            runner,
            control,
            grace: TERM_GRACE,
            poll: POLL_INTERVAL,
        }
    }

    pub fn with_timing(mut self, grace: Duration, poll: Duration) -> Self {
        self.grace = grace;
        self.poll = poll;
        self
    }

    /// Build, sync into the cache, then stop the running process so the host
    /// restarts it from the fresh build. With `install_first` the install
    /// step runs before the build, as needed by a freshly created worktree.
    pub async fn reload(
        &self,
        plugin_dir: &Path,
        build_system: &BuildSystem,
        install_first: bool,
        cache_dest: &Path,
        process_pattern: &str,
    ) -> Result<ReloadOutcome> {
        let mut outcome = ReloadOutcome {
            build_succeeded: false,
            build_output: String::new(),
            sync: None,
            pid: None,
            process_terminated: false,
            notes: Vec::new(),
        };

        let built = if install_first {
            self.build.install_and_build(plugin_dir, build_system).await
        } else {
            self.build.build_only(plugin_dir, build_system).await
        };
        match built {
            Ok(report) => {
                outcome.build_succeeded = true;
                outcome.build_output = report.output;
            }
            Err(HarnessError::BuildFailed { output, .. }) => {
                outcome.build_output = output;
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        }

        match self.cache.sync(plugin_dir, cache_dest).await {
            Ok(report) => outcome.sync = Some(report),
            Err(e) if e.code() == ErrorCode::CacheSyncFailed => {
                outcome.notes.push((
                    ErrorCode::CacheSyncFailed,
                    format!("{e}. The running process was left alone to avoid restarting a stale build."),
                ));
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        }

        let ps = ProcessCommandBuilder::new("ps")
            .args(["-eo", "pid=,args="])
            .timeout(Duration::from_secs(10))
            .build();
        let listing = match self.runner.run(ps).await {
            Ok(output) if output.status.success() => output.stdout,
            Ok(output) => {
                outcome.notes.push((
                    ErrorCode::ReloadFailed,
                    format!("ps failed: {}", output.stderr.trim()),
                ));
                return Ok(outcome);
            }
            Err(e) => {
                outcome
                    .notes
                    .push((ErrorCode::ReloadFailed, format!("ps failed: {e}")));
                return Ok(outcome);
            }
        };

        let Some(found) = find_process(&listing, process_pattern) else {
            outcome.notes.push((
                ErrorCode::ReloadFailed,
                format!(
                    "No running process matches \"{process_pattern}\". The plugin may not be running or may need a manual restart."
                ),
            ));
            return Ok(outcome);
        };
        let Some(pid) = found.pid else {
            outcome.notes.push((
                ErrorCode::ReloadFailed,
                format!("Could not parse a pid for: {}", found.command_line),
            ));
            return Ok(outcome);
        };
        outcome.pid = Some(pid);

        if let Err(e) = self.stop(pid).await {
            outcome.notes.push((ErrorCode::ReloadFailed, e.to_string()));
            return Ok(outcome);
        }
        outcome.process_terminated = true;
        Ok(outcome)
    }

    /// SIGTERM, wait for exit, SIGKILL if it is still there.
    async fn stop(&self, pid: u32) -> Result<()> {
        tracing::info!(pid, "Sending SIGTERM to plugin process");
        self.control.terminate(pid)?;

        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if !self.control.is_alive(pid) {
                return Ok(());
            }
            tokio::time::sleep(self.poll).await;
        }

        if self.control.is_alive(pid) {
            tracing::warn!(pid, "Process ignored SIGTERM, sending SIGKILL");
            self.control.force_kill(pid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::detector::Language;
    use crate::subprocess::MockProcessRunner;
    use crate::testing::FakeProcessControl;
    use tempfile::TempDir;

    fn build_system() -> BuildSystem {
        BuildSystem {
            install_command: None,
            build_command: Some(vec!["npm".into(), "run".into(), "build".into()]),
            start_command: None,
            language: Language::Typescript,
        }
    }

    fn reloader(mock: &MockProcessRunner, control: &FakeProcessControl) -> Reloader {
        let runner: Arc<dyn ProcessRunner> = Arc::new(mock.clone());
        Reloader::new(
            BuildRunner::new(Arc::clone(&runner), Duration::from_secs(5)),
            CacheSync::new(Arc::clone(&runner), Duration::from_secs(5)),
            runner,
            Arc::new(control.clone()),
        )
        .with_timing(Duration::from_millis(50), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_reload_terminates_matching_process() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();
        mock.expect_command("rsync").finish();
        mock.expect_command("ps")
            .returns_stdout("  10 bash\n4321 node /cache/demo/dist/index.js\n")
            .finish();
        let control = FakeProcessControl::with_alive(&[4321]);

        let outcome = reloader(&mock, &control)
            .reload(
                Path::new("/ws"),
                &build_system(),
                false,
                cache.path(),
                "demo/dist/index.js",
            )
            .await
            .unwrap();

        assert!(outcome.build_succeeded);
        assert!(outcome.process_terminated);
        assert_eq!(outcome.pid, Some(4321));
        assert!(outcome.notes.is_empty());
        assert_eq!(control.signals(), vec![(4321, "TERM")]);
    }

    #[tokio::test]
    async fn test_fresh_worktree_installs_before_build() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();
        mock.expect_command("rsync").finish();
        mock.expect_command("ps").returns_stdout("").finish();
        let control = FakeProcessControl::default();
        let mut build = build_system();
        build.install_command = Some(vec!["npm".into(), "install".into()]);

        let outcome = reloader(&mock, &control)
            .reload(Path::new("/ws"), &build, true, cache.path(), "demo")
            .await
            .unwrap();

        assert!(outcome.build_succeeded);
        let npm: Vec<Vec<String>> = mock
            .get_call_history()
            .into_iter()
            .filter(|c| c.program == "npm")
            .map(|c| c.args)
            .collect();
        assert_eq!(npm, vec![vec!["install"], vec!["run", "build"]]);
    }

    #[tokio::test]
    async fn test_reload_escalates_to_sigkill() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();
        mock.expect_command("rsync").finish();
        mock.expect_command("ps")
            .returns_stdout("77 node server.js\n")
            .finish();
        let control = FakeProcessControl::with_alive(&[77]);
        control.ignore_sigterm(77);

        let outcome = reloader(&mock, &control)
            .reload(Path::new("/ws"), &build_system(), false, cache.path(), "server.js")
            .await
            .unwrap();

        assert!(outcome.process_terminated);
        assert_eq!(control.signals(), vec![(77, "TERM"), (77, "KILL")]);
    }

    #[tokio::test]
    async fn test_build_failure_is_reported_not_raised() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm")
            .returns_exit_code(1)
            .returns_stdout("error TS1005")
            .finish();
        let control = FakeProcessControl::default();

        let outcome = reloader(&mock, &control)
            .reload(Path::new("/ws"), &build_system(), false, cache.path(), "x")
            .await
            .unwrap();

        assert!(!outcome.build_succeeded);
        assert!(outcome.build_output.contains("TS1005"));
        assert_eq!(mock.call_count("ps"), 0);
    }

    #[tokio::test]
    async fn test_missing_process_is_partial_success() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();
        mock.expect_command("rsync").finish();
        mock.expect_command("ps").returns_stdout("1 init\n").finish();
        let control = FakeProcessControl::default();

        let outcome = reloader(&mock, &control)
            .reload(Path::new("/ws"), &build_system(), false, cache.path(), "demo")
            .await
            .unwrap();

        assert!(outcome.build_succeeded);
        assert!(!outcome.process_terminated);
        assert_eq!(outcome.notes[0].0, ErrorCode::ReloadFailed);
        assert!(outcome.summary().contains("RELOAD_FAILED"));
    }

    #[tokio::test]
    async fn test_cache_sync_failure_is_partial_success() {
        let cache = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("npm").finish();
        mock.expect_command("rsync").returns_exit_code(11).finish();
        let control = FakeProcessControl::with_alive(&[5]);

        let outcome = reloader(&mock, &control)
            .reload(Path::new("/ws"), &build_system(), false, cache.path(), "demo")
            .await
            .unwrap();

        assert!(outcome.build_succeeded);
        assert_eq!(outcome.notes[0].0, ErrorCode::CacheSyncFailed);
        assert!(control.signals().is_empty());
    }
}
