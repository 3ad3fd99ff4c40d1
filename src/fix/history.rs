use crate::error::{HarnessError, Result};
use crate::git::{is_commit_hash, parse_log_records, parse_trailers, GitClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{SESSION_END_TYPE, TRAILER_FILES, TRAILER_ITERATION, TRAILER_TYPE};

/// A fix commit as reconstructed from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
    pub commit_hash: String,
    pub commit_title: String,
    pub trailers: BTreeMap<String, String>,
    pub files_changed: Vec<String>,
    /// Author date, ISO-8601 as reported by git.
    pub timestamp: String,
}

impl FixRecord {
    /// First seven characters of the hash.
    pub fn short_hash(&self) -> &str {
        &self.commit_hash[..self.commit_hash.len().min(7)]
    }

    /// The `PTH-Iteration` trailer, if present and numeric.
    pub fn iteration(&self) -> Option<u32> {
        self.trailers
            .get(TRAILER_ITERATION)
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Result of [`revert_fix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertOutcome {
    /// The hash that was asked to be reverted.
    pub reverted: String,
    pub original_title: String,
    /// Short hash of the compensating commit.
    pub revert_commit: String,
}

/// Fix records from the newest `max_records` commits, in log order (newest
/// first). Commits without trailers and session-end bookkeeping commits are
/// not fixes.
pub async fn get_fix_history(
    git: &GitClient,
    workspace: &Path,
    max_records: usize,
) -> Result<Vec<FixRecord>> {
    get_fix_history_since(git, workspace, None, max_records).await
}

/// [`get_fix_history`] restricted to commits made after `base_commit`.
pub async fn get_fix_history_since(
    git: &GitClient,
    workspace: &Path,
    base_commit: Option<&str>,
    max_records: usize,
) -> Result<Vec<FixRecord>> {
    let log = git.log_since(workspace, base_commit, max_records).await?;
    Ok(fix_records_from_log(&log))
}

/// Pure half of [`get_fix_history`]: turn [`LOG_FORMAT`](crate::git::parsers::LOG_FORMAT)
/// output into fix records.
pub fn fix_records_from_log(log: &str) -> Vec<FixRecord> {
    parse_log_records(log)
        .into_iter()
        .filter_map(|record| {
            let trailers = parse_trailers(&record.body);
            if trailers.is_empty() {
                return None;
            }
            if trailers.get(TRAILER_TYPE).map(String::as_str) == Some(SESSION_END_TYPE) {
                return None;
            }
            let files_changed = trailers
                .get(TRAILER_FILES)
                .map(|files| {
                    files
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(FixRecord {
                commit_hash: record.hash,
                commit_title: record.subject,
                trailers,
                files_changed,
                timestamp: record.timestamp,
            })
        })
        .collect()
}

/// Undo a fix with a compensating commit. History is never rewritten.
pub async fn revert_fix(
    git: &GitClient,
    workspace: &Path,
    commit_hash: &str,
) -> Result<RevertOutcome> {
    let hash = commit_hash.trim();
    if !is_commit_hash(hash) {
        return Err(HarnessError::InvalidRequest(format!(
            "not a commit hash: {commit_hash:?}"
        )));
    }
    let original_title = git.commit_subject(workspace, hash).await?;
    git.revert(workspace, hash).await?;
    let revert_commit = git.short_head(workspace).await?;
    tracing::info!(reverted = %hash, commit = %revert_commit, "Reverted fix: {}", original_title);
    Ok(RevertOutcome {
        reverted: hash.to_string(),
        original_title,
        revert_commit,
    })
}
