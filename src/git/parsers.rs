//! Pure parsers for git's textual output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Record separator placed before every entry in `git log` output (ASCII RS).
pub const LOG_RECORD_SEPARATOR: char = '\u{1e}';

/// `--format` string paired with [`parse_log_records`].
pub const LOG_FORMAT: &str = "--format=%x1e%H %s%n%aI%n%b";

/// Prefix shared by every trailer the harness writes.
pub const TRAILER_PREFIX: &str = "PTH-";

static TRAILER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9-]*):\s*(.+)$").expect("valid trailer regex"));

static HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("valid hash regex"));

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    /// Short branch name (without `refs/heads/`), `None` when detached.
    pub branch: Option<String>,
    pub prunable: bool,
}

/// A raw commit as reported by `git log` in [`LOG_FORMAT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub hash: String,
    pub subject: String,
    pub timestamp: String,
    pub body: String,
}

pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                prunable: false,
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = Some(head.to_string());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            entry.branch = Some(short.to_string());
        } else if line.starts_with("prunable") {
            entry.prunable = true;
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

/// Split `git log` output produced with [`LOG_FORMAT`] into records.
///
/// Chunks whose first line does not start with a hash are skipped.
pub fn parse_log_records(output: &str) -> Vec<LogRecord> {
    output
        .split(LOG_RECORD_SEPARATOR)
        .filter(|chunk| !chunk.trim().is_empty())
        .filter_map(|chunk| {
            let mut lines = chunk.splitn(3, '\n');
            let first = lines.next()?.trim_end();
            let (hash, subject) = match first.split_once(' ') {
                Some((hash, subject)) => (hash, subject),
                None => (first, ""),
            };
            if !is_commit_hash(hash) {
                return None;
            }
            let timestamp = lines.next().unwrap_or("").trim().to_string();
            let body = lines.next().unwrap_or("").trim().to_string();
            Some(LogRecord {
                hash: hash.to_string(),
                subject: subject.to_string(),
                timestamp,
                body,
            })
        })
        .collect()
}

/// Parse `Key: value` trailers from the final paragraph of a commit body.
///
/// The whole paragraph must consist of trailer lines; prose that merely
/// contains a colon is not treated as metadata. Only `PTH-*` keys are kept,
/// so `Signed-off-by` and friends never turn a commit into a fix.
pub fn parse_trailers(body: &str) -> BTreeMap<String, String> {
    let mut trailers = BTreeMap::new();
    let Some(paragraph) = body
        .trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
    else {
        return trailers;
    };

    for line in paragraph.lines() {
        match TRAILER_RE.captures(line.trim()) {
            Some(caps) if caps[1].starts_with(TRAILER_PREFIX) => {
                trailers.insert(caps[1].to_string(), caps[2].trim().to_string());
            }
            Some(_) => {}
            None => return BTreeMap::new(),
        }
    }
    trailers
}

/// Join a title and trailers into a commit message.
pub fn build_commit_message(title: &str, trailers: &BTreeMap<String, String>) -> String {
    if trailers.is_empty() {
        return title.to_string();
    }
    let lines: Vec<String> = trailers.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    format!("{title}\n\n{}", lines.join("\n"))
}

pub fn is_commit_hash(candidate: &str) -> bool {
    HASH_RE.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worktree_list() {
        let output = "worktree /repo\nHEAD 1111111111111111111111111111111111111111\nbranch refs/heads/main\n\n\
worktree /tmp/pth-worktree-demo-2026-01-01-abcdef\nHEAD 2222222222222222222222222222222222222222\nbranch refs/heads/pth/demo-2026-01-01-abcdef\n\n\
worktree /tmp/gone\nHEAD 3333333333333333333333333333333333333333\ndetached\nprunable gitdir file points to non-existent location\n";

        let entries = parse_worktree_list(output);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(
            entries[1].branch.as_deref(),
            Some("pth/demo-2026-01-01-abcdef")
        );
        assert!(entries[2].branch.is_none());
        assert!(entries[2].prunable);
    }

    #[test]
    fn test_parse_log_records_with_embedded_newlines() {
        let output = "\u{1e}abc1234def fix: handle empty group\n2026-03-01T10:00:00+00:00\nLonger explanation\nacross lines\n\nPTH-Test: list_groups\nPTH-Iteration: 2\n\
\u{1e}0123456789 initial commit\n2026-02-28T09:00:00+00:00\n\n";

        let records = parse_log_records(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hash, "abc1234def");
        assert_eq!(records[0].subject, "fix: handle empty group");
        assert_eq!(records[0].timestamp, "2026-03-01T10:00:00+00:00");
        assert!(records[0].body.ends_with("PTH-Iteration: 2"));
        assert_eq!(records[1].subject, "initial commit");
        assert!(records[1].body.is_empty());
    }

    #[test]
    fn test_parse_trailers_from_last_paragraph() {
        let body = "Why: this line is prose\n\nPTH-Test: t\nPTH-Files: a.ts, b.ts";
        let trailers = parse_trailers(body);
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers["PTH-Test"], "t");
        assert_eq!(trailers["PTH-Files"], "a.ts, b.ts");
    }

    #[test]
    fn test_parse_trailers_rejects_prose_paragraph() {
        assert!(parse_trailers("Note: see issue\nand some more prose").is_empty());
        assert!(parse_trailers("").is_empty());
    }

    #[test]
    fn test_parse_trailers_ignores_foreign_keys() {
        let body = "Update changelog\n\nSigned-off-by: Jane Dev <jane@example.com>";
        assert!(parse_trailers(body).is_empty());

        let body = "PTH-Test: t\nCo-authored-by: Sam <sam@example.com>";
        let trailers = parse_trailers(body);
        assert_eq!(trailers.len(), 1);
        assert_eq!(trailers["PTH-Test"], "t");
    }

    #[test]
    fn test_build_commit_message() {
        let mut trailers = BTreeMap::new();
        trailers.insert("PTH-Test".to_string(), "t".to_string());
        trailers.insert("PTH-Iteration".to_string(), "1".to_string());
        assert_eq!(
            build_commit_message("fix: x", &trailers),
            "fix: x\n\nPTH-Iteration: 1\nPTH-Test: t"
        );
        assert_eq!(build_commit_message("chore", &BTreeMap::new()), "chore");
    }

    #[test]
    fn test_is_commit_hash() {
        assert!(is_commit_hash("abc1234"));
        assert!(is_commit_hash(&"f".repeat(40)));
        assert!(!is_commit_hash("abc12"));
        assert!(!is_commit_hash("HEAD~1"));
        assert!(!is_commit_hash("xyz1234"));
    }
}
