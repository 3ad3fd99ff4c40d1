//! Workspace Controller: branch-scoped linked worktrees for sessions.

use chrono::{NaiveDate, Utc};

pub mod manager;

pub use manager::{PruneReport, WorkspaceController};

/// Directory-name prefix for every workspace this crate creates.
pub const WORKSPACE_DIR_PREFIX: &str = "pth-worktree-";

/// `<prefix>/<safe-name>-<YYYY-MM-DD>-<6 hex>` for today with a random suffix.
pub fn generate_session_branch(prefix: &str, plugin_name: &str) -> String {
    let suffix = format!("{:06x}", rand::random::<u32>() & 0x00ff_ffff);
    format_session_branch(prefix, plugin_name, Utc::now().date_naive(), &suffix)
}

pub fn format_session_branch(
    prefix: &str,
    plugin_name: &str,
    date: NaiveDate,
    suffix: &str,
) -> String {
    format!(
        "{}/{}-{}-{}",
        prefix.trim_end_matches('/'),
        safe_branch_component(plugin_name),
        date.format("%Y-%m-%d"),
        suffix
    )
}

/// Lowercase, with anything outside `[a-z0-9-]` replaced by `-`.
pub fn safe_branch_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Workspace directory name for a branch: everything after the first `/`,
/// with remaining slashes flattened.
pub fn workspace_dir_name(branch: &str) -> String {
    let tail = branch.split_once('/').map_or(branch, |(_, rest)| rest);
    format!("{WORKSPACE_DIR_PREFIX}{}", tail.replace('/', "-"))
}
