use crate::error::{HarnessError, Result};
use crate::git::GitClient;
use std::fs;
use std::path::{Path, PathBuf};

use super::{workspace_dir_name, WORKSPACE_DIR_PREFIX};

pub struct WorkspaceController {
    pub base_dir: PathBuf,
    git: GitClient,
}

/// Outcome of [`WorkspaceController::prune_orphans`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
}

impl WorkspaceController {
    pub fn new(base_dir: PathBuf, git: GitClient) -> Self {
        Self { base_dir, git }
    }

    pub fn workspace_path(&self, branch: &str) -> PathBuf {
        self.base_dir.join(workspace_dir_name(branch))
    }

    /// Create a new branch at the repository's HEAD and check it out into a
    /// fresh linked worktree.
    pub async fn create_workspace(&self, repo_root: &Path, branch: &str) -> Result<PathBuf> {
        if self.git.branch_exists(repo_root, branch).await? {
            return Err(HarnessError::git(
                "worktree",
                format!("branch {branch} already exists"),
                None,
                "",
            ));
        }

        let path = self.workspace_path(branch);
        if path.exists() {
            return Err(HarnessError::git(
                "worktree",
                format!("workspace path {} is already occupied", path.display()),
                None,
                "",
            ));
        }

        fs::create_dir_all(&self.base_dir).map_err(|e| {
            HarnessError::storage(&self.base_dir, "failed to create workspace base dir", e)
        })?;
        self.git
            .add_worktree_new_branch(repo_root, &path, branch)
            .await?;

        tracing::info!(branch = %branch, path = %path.display(), "Created workspace");
        Ok(path)
    }

    /// Locate the workspace for an existing branch, re-adding the linked
    /// worktree if it was removed.
    pub async fn reattach_workspace(&self, repo_root: &Path, branch: &str) -> Result<PathBuf> {
        if !self.git.branch_exists(repo_root, branch).await? {
            return Err(HarnessError::git(
                "worktree",
                format!("branch {branch} not found in {}", repo_root.display()),
                None,
                "",
            ));
        }

        if let Err(e) = self.git.prune_worktrees(repo_root).await {
            tracing::warn!("git worktree prune failed before reattach: {}", e);
        }

        let registered = self
            .git
            .list_worktrees(repo_root)
            .await?
            .into_iter()
            .find(|entry| entry.branch.as_deref() == Some(branch) && entry.path.exists());
        if let Some(entry) = registered {
            tracing::info!(branch = %branch, path = %entry.path.display(), "Reusing workspace");
            return Ok(entry.path);
        }

        let path = self.workspace_path(branch);
        if path.exists() {
            // A leftover directory that git no longer tracks.
            fs::remove_dir_all(&path).map_err(|e| {
                HarnessError::storage(&path, "failed to clear stale workspace dir", e)
            })?;
        }
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            HarnessError::storage(&self.base_dir, "failed to create workspace base dir", e)
        })?;
        self.git.add_worktree(repo_root, &path, branch).await?;

        tracing::info!(branch = %branch, path = %path.display(), "Re-added workspace");
        Ok(path)
    }

    /// Remove a workspace. The branch itself is kept. Missing paths are fine.
    pub async fn destroy_workspace(&self, repo_root: &Path, workspace: &Path) -> Result<()> {
        if workspace.exists() {
            if let Err(e) = self.git.remove_worktree(repo_root, workspace).await {
                tracing::warn!(
                    "git worktree remove failed for {}, deleting directory: {}",
                    workspace.display(),
                    e
                );
                fs::remove_dir_all(workspace).map_err(|io| {
                    HarnessError::storage(workspace, "failed to delete workspace", io)
                })?;
            }
        } else {
            tracing::debug!("Workspace {} already gone", workspace.display());
        }

        if let Err(e) = self.git.prune_worktrees(repo_root).await {
            tracing::warn!("git worktree prune failed: {}", e);
        }
        Ok(())
    }

    /// Bulk hygiene: prune git's worktree records and remove workspace
    /// directories whose `.git` pointer names a git dir that no longer exists.
    pub async fn prune_orphans(&self, repo_root: &Path) -> Result<PruneReport> {
        self.git.prune_worktrees(repo_root).await?;

        let mut report = PruneReport::default();
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => {
                return Err(HarnessError::storage(
                    &self.base_dir,
                    "failed to scan workspace dir",
                    e,
                ))
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_workspace = path.is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(WORKSPACE_DIR_PREFIX);
            if !is_workspace || !is_orphaned(&path) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::info!("Removed orphaned workspace {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        report.removed.sort();
        Ok(report)
    }
}

/// A linked worktree's `.git` is a file `gitdir: <path>`; it is orphaned when
/// that path is gone. A missing or unreadable pointer also counts.
fn is_orphaned(workspace: &Path) -> bool {
    let pointer = workspace.join(".git");
    if pointer.is_dir() {
        return false;
    }
    match fs::read_to_string(&pointer) {
        Ok(content) => match content.trim().strip_prefix("gitdir:") {
            Some(gitdir) => !Path::new(gitdir.trim()).exists(),
            None => true,
        },
        Err(_) => true,
    }
}
