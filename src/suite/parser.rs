//! YAML test documents.

use crate::error::{HarnessError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{
    ExpectBlock, GeneratedFrom, PthTest, SetupStep, StepDef, TestMode, TestType, ValidateCheck,
};

/// Lowercase, runs of non-alphanumerics collapsed to `_`, no leading or
/// trailing `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

pub fn is_slug(candidate: &str) -> bool {
    !candidate.is_empty() && slugify(candidate) == candidate
}

/// Document shape after `name` and `mode` have been checked.
#[derive(Deserialize)]
struct RawTest {
    #[serde(default)]
    id: Option<String>,
    name: String,
    mode: TestMode,
    #[serde(default, rename = "type")]
    test_type: Option<TestType>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
    #[serde(default)]
    steps: Vec<StepDef>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    stdin: Option<serde_json::Value>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    checks: Vec<ValidateCheck>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    expect: Option<ExpectBlock>,
    #[serde(default)]
    setup: Vec<SetupStep>,
    #[serde(default)]
    teardown: Vec<SetupStep>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    generated_from: Option<GeneratedFrom>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// Parse every document in `text`. Empty documents are skipped.
pub fn parse_tests(text: &str) -> Result<Vec<PthTest>> {
    let mut tests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| HarnessError::InvalidTest(format!("invalid YAML in document {}: {e}", index + 1)))?;
        if value.is_null() {
            continue;
        }
        tests.push(parse_value(value)?);
    }
    Ok(tests)
}

/// Parse text that must hold exactly one test.
pub fn parse_test(text: &str) -> Result<PthTest> {
    let mut tests = parse_tests(text)?;
    match tests.len() {
        1 => Ok(tests.remove(0)),
        0 => Err(HarnessError::InvalidTest("no test definition found".to_string())),
        n => Err(HarnessError::InvalidTest(format!(
            "expected one test definition, found {n}"
        ))),
    }
}

fn parse_value(value: serde_yaml::Value) -> Result<PthTest> {
    let name = value.get("name").and_then(|v| v.as_str()).unwrap_or("");
    if name.trim().is_empty() {
        return Err(HarnessError::InvalidTest(
            "test must have a string \"name\" field".to_string(),
        ));
    }
    match value.get("mode").and_then(|v| v.as_str()) {
        Some("mcp") | Some("plugin") => {}
        _ => {
            return Err(HarnessError::InvalidTest(format!(
                "test \"{name}\" must have mode: mcp | plugin"
            )))
        }
    }
    let name = name.to_string();

    let raw: RawTest = serde_yaml::from_value(value)
        .map_err(|e| HarnessError::InvalidTest(format!("test \"{name}\": {e}")))?;

    let test_type = match raw.mode {
        TestMode::Mcp if !raw.steps.is_empty() => TestType::Scenario,
        TestMode::Mcp => TestType::Single,
        TestMode::Plugin => raw.test_type.unwrap_or(TestType::Exec),
    };

    let id = match raw.id {
        Some(id) if is_slug(&id) => id,
        Some(id) => {
            return Err(HarnessError::InvalidTest(format!(
                "test \"{name}\": id \"{id}\" must be lowercase letters, digits and underscores"
            )))
        }
        None => slugify(&raw.name),
    };
    if id.is_empty() {
        return Err(HarnessError::InvalidTest(format!(
            "test \"{name}\": name produces an empty id"
        )));
    }

    let test = PthTest {
        id,
        name: raw.name,
        mode: raw.mode,
        test_type,
        tool: raw.tool,
        input: raw.input,
        steps: raw.steps,
        script: raw.script,
        stdin: raw.stdin,
        env: raw.env,
        checks: raw.checks,
        command: raw.command,
        expect: raw.expect.unwrap_or_default(),
        setup: raw.setup,
        teardown: raw.teardown,
        tags: raw.tags,
        generated_from: raw.generated_from,
        timeout_seconds: raw.timeout_seconds,
    };
    validate_payload(&test)?;
    Ok(test)
}

fn validate_payload(test: &PthTest) -> Result<()> {
    let missing = match test.test_type {
        TestType::Single if test.tool.as_deref().map_or(true, str::is_empty) => Some("tool"),
        TestType::Scenario if test.steps.is_empty() => Some("steps"),
        TestType::HookScript if test.script.as_deref().map_or(true, str::is_empty) => {
            Some("script")
        }
        TestType::Exec if test.command.as_deref().map_or(true, str::is_empty) => Some("command"),
        TestType::Validate if test.checks.is_empty() => Some("checks"),
        _ => None,
    };
    match missing {
        Some(field) => Err(HarnessError::InvalidTest(format!(
            "test \"{}\" of type {} requires \"{field}\"",
            test.name, test.test_type
        ))),
        None => Ok(()),
    }
}

pub fn parse_test_file(path: &Path) -> Result<Vec<PthTest>> {
    let text = fs::read_to_string(path)
        .map_err(|e| HarnessError::storage(path, "failed to read test file", e))?;
    parse_tests(&text).map_err(|e| match e {
        HarnessError::InvalidTest(msg) => {
            HarnessError::InvalidTest(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Load `*.yaml` and `*.yml` files in name order. A missing directory holds
/// no tests.
pub fn load_tests_from_dir(dir: &Path) -> Result<Vec<PthTest>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(HarnessError::storage(dir, "failed to read tests dir", e)),
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();

    let mut tests = Vec::new();
    for file in files {
        let parsed = parse_test_file(&file)?;
        tracing::debug!("Loaded {} tests from {}", parsed.len(), file.display());
        tests.extend(parsed);
    }
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create Entity — valid input"), "create_entity_valid_input");
        assert_eq!(slugify("  --Hello__World!! "), "hello_world");
        assert_eq!(slugify("!!!"), "");
        assert!(is_slug("abc_1"));
        assert!(!is_slug("Abc"));
        assert!(!is_slug("_abc"));
    }

    #[test]
    fn test_parse_single_infers_type_and_id() {
        let test = parse_test(
            "name: Get state works\nmode: mcp\ntool: get_state\ninput:\n  entity: light.kitchen\nexpect:\n  success: true\n",
        )
        .unwrap();
        assert_eq!(test.id, "get_state_works");
        assert_eq!(test.test_type, TestType::Single);
        assert_eq!(test.tool.as_deref(), Some("get_state"));
        assert_eq!(test.input.unwrap()["entity"], "light.kitchen");
        assert_eq!(test.expect.success, Some(true));
    }

    #[test]
    fn test_parse_scenario_from_steps() {
        let test = parse_test(
            "name: flow\nmode: mcp\nsteps:\n  - tool: create\n    input: {}\n    capture:\n      id: $.id\n  - tool: delete\n",
        )
        .unwrap();
        assert_eq!(test.test_type, TestType::Scenario);
        assert_eq!(test.steps.len(), 2);
        assert_eq!(test.steps[0].capture["id"], "$.id");
        assert_eq!(test.expect, ExpectBlock::default());
    }

    #[test]
    fn test_plugin_type_defaults_to_exec() {
        let test = parse_test("name: runs\nmode: plugin\ncommand: ./hooks/check.sh\n").unwrap();
        assert_eq!(test.test_type, TestType::Exec);

        let test = parse_test(
            "name: hook\nmode: plugin\ntype: hook-script\nscript: hooks/pre.sh\nstdin:\n  tool_name: Bash\n",
        )
        .unwrap();
        assert_eq!(test.test_type, TestType::HookScript);
    }

    #[test]
    fn test_explicit_id_must_be_slug_safe() {
        let test =
            parse_test("id: custom_id\nname: Anything\nmode: plugin\ncommand: 'true'\n").unwrap();
        assert_eq!(test.id, "custom_id");

        let err = parse_test("id: Not Safe\nname: x\nmode: plugin\ncommand: 'true'\n").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTest);
    }

    #[test]
    fn test_rejects_malformed_definitions() {
        let cases = [
            "mode: mcp\ntool: x\n",
            "name: 42\nmode: mcp\ntool: x\n",
            "name: x\nmode: other\n",
            "name: x\nmode: mcp\n",
            "name: x\nmode: plugin\ntype: validate\n",
            "name: x\nmode: plugin\ntype: hook-script\n",
            "name: x\nmode: plugin\ntype: bogus\ncommand: y\n",
            "name: '!!!'\nmode: plugin\ncommand: y\n",
            "name: x\nmode: mcp\ntool: t\nexpect:\n  sucess: true\n",
        ];
        for case in cases {
            let err = parse_test(case).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidTest, "{case}");
        }
    }

    #[test]
    fn test_multi_document() {
        let text = "name: a\nmode: plugin\ncommand: 'true'\n---\n---\nname: b\nmode: mcp\ntool: t\n";
        let tests = parse_tests(text).unwrap();
        let ids: Vec<&str> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(parse_test(text).is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert!(load_tests_from_dir(&dir.path().join("missing")).unwrap().is_empty());

        fs::write(dir.path().join("b.yml"), "name: second\nmode: mcp\ntool: t\n").unwrap();
        fs::write(dir.path().join("a.yaml"), "name: first\nmode: mcp\ntool: t\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not yaml").unwrap();
        let tests = load_tests_from_dir(dir.path()).unwrap();
        let ids: Vec<&str> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);

        fs::write(dir.path().join("c.yaml"), "name: broken\nmode: mcp\n").unwrap();
        let err = load_tests_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("c.yaml"));
    }
}
