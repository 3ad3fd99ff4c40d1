use crate::error::{HarnessError, Result};
use crate::fix::{
    apply_fix, get_fix_history_since, revert_fix, FileChange, FIX_TYPE, SESSION_DIR,
    TRAILER_CATEGORY, TRAILER_FILES, TRAILER_ITERATION, TRAILER_TEST, TRAILER_TYPE,
};
use crate::plugin::{cache_path, BuildRunner, CacheSync, ProcessControl, Reloader};
use crate::results::TestStatus;
use crate::session::{ActiveSession, ResultReport, SessionManager};
use crate::subprocess::ProcessRunner;
use crate::suite::{
    generate_mcp_tests, generate_plugin_tests, is_slug, parse_test, parse_tests,
    read_tools_cache, write_tools_cache, TestMode, ToolSchema,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::registry::{find_tool, render_tool_list};

const MAX_DIFF_LINES: usize = 200;
const MAX_BUILD_LINES: usize = 50;

/// One line of the request stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    pub code: Option<String>,
    pub text: String,
}

impl ToolResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            code: None,
            text: text.into(),
        }
    }

    pub fn failure(err: &HarnessError) -> Self {
        Self {
            ok: false,
            code: Some(err.code().to_string()),
            text: err.user_message(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginPathArgs {
    plugin_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartArgs {
    plugin_path: PathBuf,
    #[serde(default)]
    session_note: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeArgs {
    plugin_path: PathBuf,
    branch: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateArgs {
    #[serde(default)]
    tool_schemas: Option<Vec<ToolSchema>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTestsArgs {
    #[serde(default)]
    mode: Option<TestMode>,
    #[serde(default)]
    status: Option<TestStatus>,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Deserialize)]
struct YamlArgs {
    yaml: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditArgs {
    test_id: String,
    yaml: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordArgs {
    test_id: String,
    status: TestStatus,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default, alias = "claudeNotes")]
    notes: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct ImpactArgs {
    files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyFixArgs {
    files: Vec<FileChange>,
    commit_title: String,
    #[serde(default)]
    test_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevertArgs {
    commit_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReloadArgs {
    #[serde(default)]
    process_pattern: Option<String>,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    Ok(serde_json::from_value(args)?)
}

/// Holds the single active session and routes requests to it.
pub struct Harness {
    manager: SessionManager,
    runner: Arc<dyn ProcessRunner>,
    control: Arc<dyn ProcessControl>,
    session: Option<ActiveSession>,
}

impl Harness {
    pub fn new(
        manager: SessionManager,
        runner: Arc<dyn ProcessRunner>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            manager,
            runner,
            control,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    /// Execute one request. Failures become a response, never a panic.
    pub async fn handle(&mut self, request: ToolRequest) -> ToolResponse {
        tracing::debug!(tool = %request.tool, "Handling request");
        match self.dispatch(&request.tool, request.args).await {
            Ok(text) => ToolResponse::success(text),
            Err(err) => {
                tracing::debug!(tool = %request.tool, code = %err.code(), "Request failed");
                ToolResponse::failure(&err)
            }
        }
    }

    async fn dispatch(&mut self, tool: &str, args: Value) -> Result<String> {
        let def = find_tool(tool)
            .ok_or_else(|| HarnessError::InvalidRequest(format!("unknown tool: {tool}")))?;
        if def.needs_session && self.session.is_none() {
            return Err(HarnessError::NoActiveSession(
                "call start_session or resume_session first".to_string(),
            ));
        }

        match def.name {
            "preflight" => self.preflight(parse_args(args)?).await,
            "start_session" => self.start_session(parse_args(args)?).await,
            "resume_session" => self.resume_session(parse_args(args)?).await,
            "end_session" => self.end_session().await,
            "get_session_status" => self.session_status(),
            "generate_tests" => self.generate_tests(parse_args(args)?),
            "list_tests" => self.list_tests(parse_args(args)?),
            "register_tests" => self.register_tests(parse_args(args)?),
            "upsert_tests" => self.upsert_tests(parse_args(args)?),
            "edit_test" => self.edit_test(parse_args(args)?),
            "record_result" => self.record_result(parse_args(args)?),
            "get_results" => self.results(),
            "get_test_impact" => self.test_impact(parse_args(args)?),
            "apply_fix" => self.apply_fix(parse_args(args)?).await,
            "get_fix_history" => self.fix_history().await,
            "revert_fix" => self.revert_fix(parse_args(args)?).await,
            "diff_session" => self.diff_session().await,
            "sync_to_cache" => self.sync_to_cache().await,
            "reload_plugin" => self.reload_plugin(parse_args(args)?).await,
            "complete_iteration" => self.complete_iteration(),
            "get_convergence" => self.convergence(),
            "list_tools" => Ok(render_tool_list()),
            other => Err(HarnessError::InvalidRequest(format!("unknown tool: {other}"))),
        }
    }

    fn active(&self) -> Result<&ActiveSession> {
        self.session
            .as_ref()
            .ok_or_else(|| HarnessError::NoActiveSession("call start_session first".to_string()))
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        self.session
            .as_mut()
            .ok_or_else(|| HarnessError::NoActiveSession("call start_session first".to_string()))
    }

    fn reject_if_active(&self) -> Result<()> {
        match &self.session {
            Some(session) => Err(HarnessError::SessionAlreadyActive {
                pid: std::process::id(),
                branch: session.state.branch.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn preflight(&self, args: PluginPathArgs) -> Result<String> {
        Ok(self.manager.preflight(&args.plugin_path).await.render())
    }

    async fn start_session(&mut self, args: StartArgs) -> Result<String> {
        self.reject_if_active()?;
        let session = self
            .manager
            .start(&args.plugin_path, args.session_note)
            .await?;
        let state = &session.state;
        let text = [
            "PTH session started.".to_string(),
            String::new(),
            format!("Branch:    {}", state.branch),
            format!("Workspace: {}", state.worktree_path.display()),
            format!("Plugin:    {} ({} mode)", state.plugin_name, state.plugin_mode),
            format!("Build:     {}", session.build.describe()),
            format!("Tests:     {} loaded", session.tests.count()),
            String::new(),
            "Next: generate_tests or register_tests, then run the tests and record_result."
                .to_string(),
        ]
        .join("\n");
        self.session = Some(session);
        Ok(text)
    }

    async fn resume_session(&mut self, args: ResumeArgs) -> Result<String> {
        self.reject_if_active()?;
        let session = self.manager.resume(&args.plugin_path, &args.branch).await?;
        let state = &session.state;
        let mut lines = vec![
            "PTH session resumed.".to_string(),
            String::new(),
            format!("Branch:    {}", state.branch),
            format!("Workspace: {}", state.worktree_path.display()),
            format!("Iteration: {}", state.iteration),
            format!("Tests:     {} loaded", session.tests.count()),
            format!("Trend:     {}", state.convergence_trend),
        ];
        if session.state_reconstructed {
            lines.push(String::new());
            lines.push(
                "Session state was missing and has been rebuilt from fix history.".to_string(),
            );
        }
        lines.push(String::new());
        lines.push("Results are not carried over: re-run the suite and record_result.".to_string());
        self.session = Some(session);
        Ok(lines.join("\n"))
    }

    async fn end_session(&mut self) -> Result<String> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HarnessError::NoActiveSession("nothing to end".to_string()))?;
        let outcome = self.manager.end(session).await?;
        self.session = None;
        Ok(outcome.summary())
    }

    fn session_status(&self) -> Result<String> {
        let session = self.active()?;
        let state = &session.state;
        Ok([
            format!("Session:   {}", state.branch),
            format!("Mode:      {}", state.plugin_mode),
            format!("Iteration: {} (in progress: {})", state.iteration, state.current_iteration()),
            format!(
                "Tests:     {} total, {} passing, {} failing",
                session.tests.count(),
                session.results.pass_count(),
                session.results.fail_count()
            ),
            format!("Fixes:     {} this iteration", state.fixes_this_iteration),
            format!("Trend:     {}", session.trend()),
            format!("Started:   {}", state.started_at.format("%Y-%m-%d %H:%M UTC")),
        ]
        .join("\n"))
    }

    fn generate_tests(&mut self, args: GenerateArgs) -> Result<String> {
        let session = self.active_mut()?;
        let workspace = session.workspace().to_path_buf();
        let tests = match session.state.plugin_mode {
            TestMode::Mcp => {
                let schemas = match args.tool_schemas {
                    Some(schemas) => {
                        write_tools_cache(&workspace, &schemas)?;
                        schemas
                    }
                    None => read_tools_cache(&workspace)?,
                };
                generate_mcp_tests(&schemas)
            }
            TestMode::Plugin => generate_plugin_tests(&session.state.workspace_plugin_path()),
        };

        if tests.is_empty() {
            let guidance = match session.state.plugin_mode {
                TestMode::Mcp => {
                    "No tool schemas found. Pass toolSchemas from the plugin's tools/list response."
                }
                TestMode::Plugin => {
                    "No hook scripts found under hooks/ or scripts/. Author tests with register_tests."
                }
            };
            return Ok(format!("Generated 0 tests.\n\n{guidance}"));
        }

        let names: Vec<String> = tests.iter().map(|t| format!("- {}", t.name)).collect();
        let merged = session.tests.merge(tests);
        session.persist_tests()?;
        Ok(format!(
            "Generated {} tests ({} added, {} updated):\n\n{}",
            names.len(),
            merged.added,
            merged.updated,
            names.join("\n")
        ))
    }

    fn list_tests(&self, args: ListTestsArgs) -> Result<String> {
        let session = self.active()?;
        let tests = session.tests.filter(|t| {
            args.mode.map_or(true, |mode| t.mode == mode)
                && args.tag.as_deref().map_or(true, |tag| t.has_tag(tag))
                && args
                    .status
                    .map_or(true, |status| session.results.latest_status(&t.id) == status)
        });
        if tests.is_empty() {
            return Ok("No tests match the filter.".to_string());
        }

        let mut filters = Vec::new();
        if let Some(mode) = args.mode {
            filters.push(format!("mode={mode}"));
        }
        if let Some(status) = args.status {
            filters.push(format!("status={status}"));
        }
        if let Some(tag) = &args.tag {
            filters.push(format!("tag={tag}"));
        }
        let header = if filters.is_empty() {
            format!(
                "{} tests ({} passing, {} failing):",
                tests.len(),
                session.results.pass_count(),
                session.results.fail_count()
            )
        } else {
            format!("{} tests ({}):", tests.len(), filters.join(", "))
        };
        let lines: Vec<String> = tests
            .iter()
            .map(|t| {
                let status = session.results.latest_status(&t.id);
                format!("{} [{}] {}", status.icon(), t.id, t.name)
            })
            .collect();
        Ok(format!("{header}\n\n{}", lines.join("\n")))
    }

    fn register_tests(&mut self, args: YamlArgs) -> Result<String> {
        let tests = parse_tests(&args.yaml)?;
        if tests.is_empty() {
            return Err(HarnessError::InvalidTest("no test documents found".to_string()));
        }
        let session = self.active_mut()?;
        let mut seen = std::collections::HashSet::new();
        for test in &tests {
            if session.tests.contains(&test.id) || !seen.insert(test.id.as_str()) {
                return Err(HarnessError::InvalidTest(format!(
                    "test {} already exists",
                    test.id
                )));
            }
        }
        let lines: Vec<String> = tests
            .iter()
            .map(|t| format!("- [{}] {}", t.id, t.name))
            .collect();
        for test in tests {
            session.tests.add(test)?;
        }
        session.persist_tests()?;
        Ok(format!("Registered {} tests:\n{}", lines.len(), lines.join("\n")))
    }

    fn upsert_tests(&mut self, args: YamlArgs) -> Result<String> {
        let tests = parse_tests(&args.yaml)?;
        let session = self.active_mut()?;
        let merged = session.tests.merge(tests);
        session.persist_tests()?;
        Ok(format!(
            "Upserted {} tests ({} added, {} updated). Suite now has {} tests.",
            merged.added + merged.updated,
            merged.added,
            merged.updated,
            session.tests.count()
        ))
    }

    fn edit_test(&mut self, args: EditArgs) -> Result<String> {
        if !is_slug(&args.test_id) {
            return Err(HarnessError::InvalidRequest(format!(
                "testId {:?} is not a valid id",
                args.test_id
            )));
        }
        let mut test = parse_test(&args.yaml)?;
        let note = if test.id != args.test_id {
            format!(" (YAML id '{}' ignored, kept '{}')", test.id, args.test_id)
        } else {
            String::new()
        };
        test.id = args.test_id;
        let name = test.name.clone();

        let session = self.active_mut()?;
        let replaced = session.tests.update(test);
        session.persist_tests()?;
        let verb = if replaced { "updated" } else { "added" };
        Ok(format!("Test {verb}: {name}{note}"))
    }

    fn record_result(&mut self, args: RecordArgs) -> Result<String> {
        let session = self.active_mut()?;
        let mut report = ResultReport::new(args.test_id, args.status);
        report.duration_ms = args.duration_ms;
        report.failure_reason = args.failure_reason;
        report.notes = args.notes;
        report.category = args.category;

        let result = session.record_result(report)?;
        let reason = result
            .failure_reason
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        Ok(format!(
            "Recorded: {} → {}{} [iteration {}]\nTotals:   {} passing, {} failing",
            result.test_name,
            result.status,
            reason,
            result.iteration,
            session.results.pass_count(),
            session.results.fail_count()
        ))
    }

    fn results(&self) -> Result<String> {
        let session = self.active()?;
        let all = session.tests.get_all();
        if all.is_empty() {
            return Ok("No tests in suite. Run generate_tests first.".to_string());
        }
        let mut skipped = 0;
        let mut lines = Vec::with_capacity(all.len());
        for test in &all {
            let latest = session.results.get_latest(&test.id);
            let status = latest.map_or(TestStatus::Pending, |r| r.status);
            if status == TestStatus::Skipped {
                skipped += 1;
            }
            let mut line = format!("{} {}", status.icon(), test.name);
            if let Some(reason) = latest.and_then(|r| r.failure_reason.as_deref()) {
                line.push_str(&format!("\n  ↳ {reason}"));
            }
            lines.push(line);
        }
        let pass = session.results.pass_count();
        let fail = session.results.fail_count();
        let pending = all.len().saturating_sub(pass + fail + skipped);
        let mut summary = vec![format!("{pass} passing"), format!("{fail} failing")];
        if skipped > 0 {
            summary.push(format!("{skipped} skipped"));
        }
        summary.push(format!("{pending} pending"));
        Ok(format!("{}\n\n{}", summary.join(" / "), lines.join("\n")))
    }

    fn test_impact(&self, args: ImpactArgs) -> Result<String> {
        let session = self.active()?;
        let stems: Vec<String> = args
            .files
            .iter()
            .filter_map(|f| Path::new(f).file_stem())
            .map(|s| s.to_string_lossy().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let impacted = session.tests.filter(|t| {
            let name = t.name.to_lowercase();
            stems
                .iter()
                .any(|stem| name.contains(stem.as_str()) || t.id.contains(stem.as_str()))
        });
        if impacted.is_empty() {
            return Ok(format!(
                "No tests found with obvious dependency on: {}\nConsider running the full suite.",
                args.files.join(", ")
            ));
        }
        let lines: Vec<String> = impacted.iter().map(|t| format!("- {}", t.name)).collect();
        Ok(format!(
            "{} likely-impacted tests:\n{}",
            impacted.len(),
            lines.join("\n")
        ))
    }

    async fn apply_fix(&mut self, args: ApplyFixArgs) -> Result<String> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HarnessError::NoActiveSession("call start_session first".to_string()))?;
        let iteration = session.state.current_iteration();
        let paths: Vec<&str> = args.files.iter().map(|f| f.path.as_str()).collect();

        let mut trailers = BTreeMap::new();
        if let Some(test_id) = &args.test_id {
            trailers.insert(TRAILER_TEST.to_string(), test_id.clone());
        }
        if let Some(category) = &args.category {
            trailers.insert(TRAILER_CATEGORY.to_string(), category.clone());
        }
        trailers.insert(TRAILER_ITERATION.to_string(), iteration.to_string());
        trailers.insert(TRAILER_FILES.to_string(), paths.join(", "));
        trailers.insert(TRAILER_TYPE.to_string(), FIX_TYPE.to_string());

        let hash = apply_fix(
            self.manager.git(),
            session.workspace(),
            &session.state.plugin_rel_path,
            &args.files,
            &args.commit_title,
            &trailers,
        )
        .await?;
        session.note_fix_applied()?;

        Ok(format!(
            "Fix committed: {hash} (iteration {iteration})\n{}\nFiles: {}\n\nNext: re-run affected tests; get_test_impact lists the likely ones.",
            args.commit_title.trim(),
            paths.join(", ")
        ))
    }

    async fn fix_history(&self) -> Result<String> {
        let session = self.active()?;
        let history = get_fix_history_since(
            self.manager.git(),
            session.workspace(),
            session.state.base_commit.as_deref(),
            self.manager.config().max_log_records,
        )
        .await?;
        if history.is_empty() {
            return Ok("No fix commits on this session branch yet.".to_string());
        }
        let lines: Vec<String> = history
            .iter()
            .map(|fix| {
                let mut line = format!("{} {}", fix.short_hash(), fix.commit_title);
                if let Some(test) = fix.trailers.get(TRAILER_TEST) {
                    line.push_str(&format!("\n  Test:      {test}"));
                }
                if let Some(category) = fix.trailers.get(TRAILER_CATEGORY) {
                    line.push_str(&format!("\n  Category:  {category}"));
                }
                if let Some(iteration) = fix.iteration() {
                    line.push_str(&format!("\n  Iteration: {iteration}"));
                }
                line
            })
            .collect();
        Ok(format!(
            "{} fix commits:\n\n{}",
            history.len(),
            lines.join("\n")
        ))
    }

    async fn revert_fix(&self, args: RevertArgs) -> Result<String> {
        let session = self.active()?;
        let outcome = revert_fix(self.manager.git(), session.workspace(), &args.commit_hash).await?;
        Ok(format!(
            "Reverted: {} ({})\nRevert commit: {}\n\nNext: re-run affected tests to verify the revert resolved the regression.",
            outcome.reverted, outcome.original_title, outcome.revert_commit
        ))
    }

    async fn diff_session(&self) -> Result<String> {
        let session = self.active()?;
        let base = session.state.base_commit.as_deref().unwrap_or("HEAD");
        let diff = self
            .manager
            .git()
            .diff(session.workspace(), base, SESSION_DIR)
            .await?;
        if diff.trim().is_empty() {
            return Ok("No changes on session branch yet.".to_string());
        }
        let lines: Vec<&str> = diff.lines().collect();
        let (display, suffix) = if lines.len() > MAX_DIFF_LINES {
            (
                lines[..MAX_DIFF_LINES].join("\n"),
                format!(
                    "\n\n[Truncated: showing {MAX_DIFF_LINES} of {} lines. Use get_fix_history for a structured summary.]",
                    lines.len()
                ),
            )
        } else {
            (lines.join("\n"), String::new())
        };
        Ok(format!(
            "Session diff ({} lines):\n\n{display}{suffix}",
            lines.len()
        ))
    }

    fn cache_destination(&self, session: &ActiveSession) -> PathBuf {
        cache_path(&self.manager.config().cache_dir, &session.state.plugin_name)
    }

    async fn sync_to_cache(&self) -> Result<String> {
        let session = self.active()?;
        let destination = self.cache_destination(session);
        let sync = CacheSync::new(self.runner.clone(), self.manager.config().build_timeout());
        let report = sync
            .sync(&session.state.workspace_plugin_path(), &destination)
            .await?;
        let count = match report.files_transferred {
            Some(0) => "No files changed".to_string(),
            Some(n) => format!("{n} file(s) synced"),
            None => "Files copied".to_string(),
        };
        Ok(format!(
            "Synced workspace to cache: {}\n{count}. Hook script changes are now live.",
            report.destination.display()
        ))
    }

    async fn reload_plugin(&mut self, args: ReloadArgs) -> Result<String> {
        let pattern = match args.process_pattern {
            Some(pattern) if pattern.trim().is_empty() => {
                return Err(HarnessError::InvalidRequest(
                    "processPattern must not be blank".to_string(),
                ))
            }
            Some(pattern) => pattern,
            None => self
                .cache_destination(self.active()?)
                .to_string_lossy()
                .into_owned(),
        };
        let timeout = self.manager.config().build_timeout();
        let reloader = Reloader::new(
            BuildRunner::new(self.runner.clone(), timeout),
            CacheSync::new(self.runner.clone(), timeout),
            self.runner.clone(),
            self.control.clone(),
        );
        let destination = self.cache_destination(self.active()?);
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HarnessError::NoActiveSession("call start_session first".to_string()))?;
        let outcome = reloader
            .reload(
                &session.state.workspace_plugin_path(),
                &session.build,
                !session.dependencies_installed,
                &destination,
                &pattern,
            )
            .await?;
        if outcome.build_succeeded {
            session.dependencies_installed = true;
        }

        let mut sections = vec![if outcome.build_succeeded {
            "✓ Build succeeded".to_string()
        } else {
            "✗ Build failed".to_string()
        }];
        if !outcome.build_output.trim().is_empty() {
            sections.push(format!(
                "Build output:\n{}",
                truncate_lines(&outcome.build_output, MAX_BUILD_LINES)
            ));
        }
        sections.push(outcome.summary());
        Ok(sections.join("\n"))
    }

    fn complete_iteration(&mut self) -> Result<String> {
        let session = self.active_mut()?;
        let header = match session.complete_iteration()? {
            Some(summary) => format!(
                "Iteration {} complete: {} passing, {} failing, {} fixes applied.",
                summary.iteration, summary.passing, summary.failing, summary.fixes_applied
            ),
            None => format!(
                "Iteration {} closed with no recorded results. No snapshot was taken and the trend is unchanged.",
                session.state.iteration
            ),
        };
        Ok(format!("{header}\n\n{}", self.convergence()?))
    }

    fn convergence(&self) -> Result<String> {
        let session = self.active()?;
        let trend = session.trend();
        Ok([
            format!(
                "Iteration: {}    Trend: {}",
                session.state.iteration, trend
            ),
            format!("Recommendation: {}", trend.recommendation()),
            String::new(),
            session.state.iteration_history.markdown_table(),
        ]
        .join("\n"))
    }
}

fn truncate_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return text.trim_end().to_string();
    }
    format!(
        "{}\n[Truncated: {} more lines]",
        lines[..max].join("\n"),
        lines.len() - max
    )
}
