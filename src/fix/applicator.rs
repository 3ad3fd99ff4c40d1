use crate::error::{HarnessError, Result};
use crate::git::{build_commit_message, GitClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directory holding session bookkeeping inside a workspace.
pub const SESSION_DIR: &str = ".pth";

/// Full new content for one file, relative to the plugin root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Relative to the plugin root. Absolute paths and `..` are rejected.
    pub path: String,
    pub content: String,
}

/// Write `files` under `<workspace>/<plugin_rel_path>` and commit exactly those
/// paths with `trailers` appended. Returns the new commit's short hash.
pub async fn apply_fix(
    git: &GitClient,
    workspace: &Path,
    plugin_rel_path: &str,
    files: &[FileChange],
    title: &str,
    trailers: &BTreeMap<String, String>,
) -> Result<String> {
    if files.is_empty() {
        return Err(HarnessError::InvalidPlugin(
            "apply_fix requires at least one file change".to_string(),
        ));
    }
    let title = title.trim();
    if title.is_empty() || title.contains('\n') {
        return Err(HarnessError::InvalidRequest(
            "commit title must be a single non-empty line".to_string(),
        ));
    }
    validate_trailers(trailers)?;

    let mut repo_paths = Vec::with_capacity(files.len());
    for change in files {
        repo_paths.push(repo_relative_path(plugin_rel_path, &change.path)?);
    }

    for (change, relative) in files.iter().zip(&repo_paths) {
        let full = workspace.join(relative);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HarnessError::storage(parent, "failed to create directory", e))?;
        }
        fs::write(&full, &change.content)
            .map_err(|e| HarnessError::storage(&full, "failed to write fix file", e))?;
    }

    let paths: Vec<String> = repo_paths
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    let message = build_commit_message(title, trailers);
    git.commit_paths(workspace, &message, &paths).await?;

    let hash = git.short_head(workspace).await?;
    tracing::info!(commit = %hash, files = paths.len(), "Committed fix: {}", title);
    Ok(hash)
}

/// Resolve a plugin-relative path to a repository-relative one, rejecting
/// anything that escapes the plugin or touches git or session bookkeeping.
pub fn repo_relative_path(plugin_rel_path: &str, file: &str) -> Result<PathBuf> {
    let file_path = Path::new(file);
    if file.trim().is_empty() {
        return Err(HarnessError::InvalidPlugin("file path must not be empty".to_string()));
    }
    let mut clean = PathBuf::new();
    for component in file_path.components() {
        match component {
            Component::Normal(part) => {
                if part == ".git" {
                    return Err(HarnessError::InvalidPlugin(format!(
                        "refusing to write inside .git: {file}"
                    )));
                }
                clean.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(HarnessError::InvalidPlugin(format!(
                    "file path must be relative to the plugin root: {file}"
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(HarnessError::InvalidPlugin(format!("not a file path: {file}")));
    }

    let full = Path::new(plugin_rel_path).join(&clean);
    let touches_session_dir = [clean.as_path(), full.as_path()]
        .iter()
        .any(|p| p.components().next() == Some(Component::Normal(OsStr::new(SESSION_DIR))));
    if touches_session_dir {
        return Err(HarnessError::InvalidPlugin(format!(
            "{SESSION_DIR}/ holds session state and cannot be part of a fix: {file}"
        )));
    }
    Ok(full)
}

fn validate_trailers(trailers: &BTreeMap<String, String>) -> Result<()> {
    for (key, value) in trailers {
        let key_ok = key.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !key_ok {
            return Err(HarnessError::InvalidRequest(format!(
                "invalid trailer key: {key:?}"
            )));
        }
        if value.trim().is_empty() || value.contains('\n') {
            return Err(HarnessError::InvalidRequest(format!(
                "trailer {key} must have a single-line value"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_repo_relative_path() {
        assert_eq!(
            repo_relative_path("plugins/demo", "src/index.ts").unwrap(),
            PathBuf::from("plugins/demo/src/index.ts")
        );
        assert_eq!(
            repo_relative_path("", "./hooks/pre.sh").unwrap(),
            PathBuf::from("hooks/pre.sh")
        );
    }

    #[test]
    fn test_rejects_escaping_and_bookkeeping_paths() {
        for bad in [
            "../outside.ts",
            "/etc/passwd",
            ".git/config",
            "src/.git/x",
            ".pth/session-state.json",
            "",
        ] {
            let err = repo_relative_path("", bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidPlugin, "{bad}");
        }
        assert!(repo_relative_path("plugins/demo", ".pth/x").is_err());
    }

    #[test]
    fn test_trailer_validation() {
        let mut trailers = BTreeMap::new();
        trailers.insert("PTH-Test".to_string(), "t".to_string());
        assert!(validate_trailers(&trailers).is_ok());

        trailers.insert("Bad Key".to_string(), "v".to_string());
        assert!(validate_trailers(&trailers).is_err());

        let mut multiline = BTreeMap::new();
        multiline.insert("PTH-Note".to_string(), "a\nb".to_string());
        assert_eq!(
            validate_trailers(&multiline).unwrap_err().code(),
            ErrorCode::InvalidRequest
        );
    }
}
