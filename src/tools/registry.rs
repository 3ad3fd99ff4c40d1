//! Static catalogue of caller-facing operations.

/// One operation exposed over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Argument summary shown by `list_tools`.
    pub args: &'static str,
    /// Rejected with `NO_ACTIVE_SESSION` unless a session is active.
    pub needs_session: bool,
}

const fn tool(
    name: &'static str,
    description: &'static str,
    args: &'static str,
    needs_session: bool,
) -> ToolDef {
    ToolDef {
        name,
        description,
        args,
        needs_session,
    }
}

#[rustfmt::skip]
pub const TOOLS: &[ToolDef] = &[
    tool("preflight", "Check whether a plugin is ready for a session", "pluginPath", false),
    tool("start_session", "Lock the plugin and open a new session branch and workspace", "pluginPath, sessionNote?", false),
    tool("resume_session", "Reattach to an existing session branch", "pluginPath, branch", false),
    tool("end_session", "Write the report, commit session artefacts and release the lock", "", true),
    tool("get_session_status", "Show branch, iteration, counts and trend", "", true),
    tool("generate_tests", "Generate tests from tool schemas or hook scripts", "toolSchemas?", true),
    tool("list_tests", "List tests with their latest status", "mode?, status?, tag?", true),
    tool("register_tests", "Add tests from YAML; duplicate ids are rejected", "yaml", true),
    tool("upsert_tests", "Add or replace tests from YAML", "yaml", true),
    tool("edit_test", "Replace one test, keeping the given id", "testId, yaml", true),
    tool("record_result", "Record a test outcome for the current iteration", "testId, status, durationMs?, failureReason?, notes?, category?", true),
    tool("get_results", "Summarise the latest result of every test", "", true),
    tool("get_test_impact", "Find tests likely affected by changed files", "files", true),
    tool("apply_fix", "Write files and commit them as a trailer-tagged fix", "files, commitTitle, testId?, category?", true),
    tool("get_fix_history", "List fix commits on the session branch", "", true),
    tool("revert_fix", "Revert a fix with a compensating commit", "commitHash", true),
    tool("diff_session", "Show the diff of the session branch against its base", "", true),
    tool("sync_to_cache", "Copy the workspace plugin into the plugin cache", "", true),
    tool("reload_plugin", "Build, sync to cache and restart the running plugin", "processPattern?", true),
    tool("complete_iteration", "Close the current iteration and reclassify the trend", "", true),
    tool("get_convergence", "Show the convergence trend and iteration history", "", true),
    tool("list_tools", "List available operations", "", false),
];

/// Look up a tool by name, accepting an optional `pth_` prefix.
pub fn find_tool(name: &str) -> Option<&'static ToolDef> {
    let name = name.strip_prefix("pth_").unwrap_or(name);
    TOOLS.iter().find(|t| t.name == name)
}

pub fn render_tool_list() -> String {
    let width = TOOLS.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut lines = vec![format!("{} tools:", TOOLS.len()), String::new()];
    for t in TOOLS {
        let args = if t.args.is_empty() {
            String::new()
        } else {
            format!(" ({})", t.args)
        };
        lines.push(format!("{:width$}  {}{}", t.name, t.description, args));
    }
    lines.join("\n")
}
