use crate::error::{HarnessError, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Directories never copied into the cache.
const EXCLUDED: [&str; 2] = [".git", ".pth"];

static TRANSFERRED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Number of (?:regular )?files transferred: ([\d,]+)").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
    Rsync,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub destination: PathBuf,
    pub method: SyncMethod,
    /// Reported by rsync; unknown for the copy fallback.
    pub files_transferred: Option<usize>,
}

/// Cache directory Claude Code loads a plugin from.
pub fn cache_path(cache_dir: &Path, plugin_name: &str) -> PathBuf {
    cache_dir.join(plugin_name)
}

#[derive(Clone)]
pub struct CacheSync {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl CacheSync {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Mirror `source` into `destination`.
    pub async fn sync(&self, source: &Path, destination: &Path) -> Result<SyncReport> {
        fs::create_dir_all(destination).map_err(|e| {
            HarnessError::CacheSyncFailed(format!(
                "failed to create {}: {e}",
                destination.display()
            ))
        })?;

        let mut args = vec!["-a".to_string(), "--delete".to_string(), "--stats".to_string()];
        for dir in EXCLUDED {
            args.push("--exclude".to_string());
            args.push(dir.to_string());
        }
        args.push(format!("{}/", source.display()));
        args.push(format!("{}/", destination.display()));

        let command = ProcessCommandBuilder::new("rsync")
            .args(&args)
            .timeout(self.timeout)
            .build();

        match self.runner.run(command).await {
            Ok(output) if output.status.success() => {
                let files_transferred = TRANSFERRED_RE
                    .captures(&output.stdout)
                    .and_then(|caps| caps[1].replace(',', "").parse().ok());
                tracing::info!(
                    "Synced {} to {} ({:?} files)",
                    source.display(),
                    destination.display(),
                    files_transferred
                );
                Ok(SyncReport {
                    destination: destination.to_path_buf(),
                    method: SyncMethod::Rsync,
                    files_transferred,
                })
            }
            Ok(output) if output.status.code() == Some(127) => {
                self.copy_fallback(source, destination).await
            }
            Ok(output) => Err(HarnessError::CacheSyncFailed(format!(
                "rsync failed (exit {:?}): {}",
                output.status.code(),
                output.stderr.trim()
            ))),
            Err(ProcessError::CommandNotFound(_)) => {
                self.copy_fallback(source, destination).await
            }
            Err(ProcessError::Timeout { command, after }) => {
                Err(HarnessError::Timeout { command, after })
            }
            Err(e) => Err(HarnessError::CacheSyncFailed(e.to_string())),
        }
    }

    async fn copy_fallback(&self, source: &Path, destination: &Path) -> Result<SyncReport> {
        tracing::warn!("rsync not available, falling back to cp -R");
        let command = ProcessCommandBuilder::new("cp")
            .arg("-R")
            .arg(format!("{}/.", source.display()))
            .arg(destination.to_string_lossy())
            .timeout(self.timeout)
            .build();

        let output = self
            .runner
            .run(command)
            .await
            .map_err(|e| HarnessError::CacheSyncFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(HarnessError::CacheSyncFailed(format!(
                "cp failed (exit {:?}): {}",
                output.status.code(),
                output.stderr.trim()
            )));
        }

        for dir in EXCLUDED {
            let copied = destination.join(dir);
            let removed = if copied.is_dir() {
                fs::remove_dir_all(&copied)
            } else {
                fs::remove_file(&copied)
            };
            if let Err(e) = removed {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to drop {} from cache: {}", copied.display(), e);
                }
            }
        }

        Ok(SyncReport {
            destination: destination.to_path_buf(),
            method: SyncMethod::Copy,
            files_transferred: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::subprocess::MockProcessRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rsync_reports_transfer_count() {
        let dest = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("rsync")
            .returns_stdout("Number of files: 10\nNumber of regular files transferred: 3\n")
            .finish();

        let sync = CacheSync::new(Arc::new(mock.clone()), Duration::from_secs(30));
        let report = sync.sync(Path::new("/ws/plugin"), dest.path()).await.unwrap();

        assert_eq!(report.method, SyncMethod::Rsync);
        assert_eq!(report.files_transferred, Some(3));
        let args = &mock.get_call_history()[0].args;
        assert!(args.contains(&"--delete".to_string()));
        assert!(args.windows(2).any(|w| w == ["--exclude", ".git"]));
        assert!(args.windows(2).any(|w| w == ["--exclude", ".pth"]));
        assert_eq!(args.last().unwrap(), &format!("{}/", dest.path().display()));
    }

    #[tokio::test]
    async fn test_falls_back_to_cp_when_rsync_missing() {
        let dest = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("rsync").returns_not_found().finish();
        mock.expect_command("cp").returns_success().finish();

        let sync = CacheSync::new(Arc::new(mock.clone()), Duration::from_secs(30));
        let report = sync.sync(Path::new("/ws/plugin"), dest.path()).await.unwrap();
        assert_eq!(report.method, SyncMethod::Copy);
        assert_eq!(mock.call_count("cp"), 1);
    }

    #[tokio::test]
    async fn test_rsync_failure_does_not_fall_back() {
        let dest = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("rsync")
            .returns_exit_code(23)
            .returns_stderr("rsync: permission denied")
            .finish();

        let sync = CacheSync::new(Arc::new(mock.clone()), Duration::from_secs(30));
        let err = sync
            .sync(Path::new("/ws/plugin"), dest.path())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CacheSyncFailed);
        assert_eq!(mock.call_count("cp"), 0);
    }

    #[tokio::test]
    async fn test_real_copy_excludes_bookkeeping() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(src.path().join("index.js"), "console.log(1)").unwrap();
        fs::create_dir(src.path().join(".pth")).unwrap();
        fs::write(src.path().join(".pth/session-state.json"), "{}").unwrap();

        let sync = CacheSync::new(
            Arc::new(crate::subprocess::TokioProcessRunner),
            Duration::from_secs(30),
        );
        sync.sync(src.path(), dest.path()).await.unwrap();

        assert!(dest.path().join("index.js").exists());
        assert!(!dest.path().join(".pth").exists());
    }
}
