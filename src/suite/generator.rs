//! Test proposals from introspected tool schemas and plugin sources.

use crate::error::{HarnessError, Result};
use crate::storage::{read_optional, write_atomic};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::parser::slugify;
use super::types::{
    CheckType, ExpectBlock, GeneratedFrom, PthTest, TestMode, TestType, ValidateCheck,
};

pub const TOOLS_CACHE_FILE: &str = ".pth-tools-cache.json";

/// Timeout attached to schema-generated tests.
const GENERATED_TIMEOUT_SECS: u64 = 10;

/// Directories scanned for hook scripts in plugin mode.
const SCRIPT_DIRS: [&str; 2] = ["hooks", "scripts"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// One entry of a tool server's `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: InputSchema,
}

/// `<tool>_valid_input` for every tool, plus `<tool>_missing_required` when
/// the tool has required fields.
pub fn generate_mcp_tests(schemas: &[ToolSchema]) -> Vec<PthTest> {
    let mut tests = Vec::new();
    for tool in schemas {
        let valid_input = minimal_input(&tool.input_schema);

        let mut valid = PthTest::new(
            slugify(&format!("{}_valid_input", tool.name)),
            format!("{} valid input", tool.name),
            TestMode::Mcp,
            TestType::Single,
        );
        valid.tool = Some(tool.name.clone());
        valid.input = Some(Value::Object(valid_input.clone()));
        valid.expect = ExpectBlock {
            success: Some(true),
            ..ExpectBlock::default()
        };
        valid.generated_from = Some(GeneratedFrom::Schema);
        valid.timeout_seconds = Some(GENERATED_TIMEOUT_SECS);
        tests.push(valid);

        if let Some(first_required) = tool.input_schema.required.first() {
            let mut missing_input = valid_input;
            missing_input.remove(first_required);

            let mut missing = PthTest::new(
                slugify(&format!("{}_missing_required", tool.name)),
                format!("{} missing required field \"{first_required}\"", tool.name),
                TestMode::Mcp,
                TestType::Single,
            );
            missing.tool = Some(tool.name.clone());
            missing.input = Some(Value::Object(missing_input));
            missing.expect = ExpectBlock {
                success: Some(false),
                ..ExpectBlock::default()
            };
            missing.generated_from = Some(GeneratedFrom::Schema);
            missing.timeout_seconds = Some(GENERATED_TIMEOUT_SECS);
            tests.push(missing);
        }
    }
    tests
}

/// Minimal values for required fields only.
fn minimal_input(schema: &InputSchema) -> Map<String, Value> {
    let mut input = Map::new();
    for field in &schema.required {
        let value = match schema.properties.get(field) {
            None => json!(""),
            Some(prop) => match prop.property_type.as_deref() {
                Some("string") => prop
                    .enum_values
                    .as_ref()
                    .and_then(|values| values.first().cloned())
                    .unwrap_or_else(|| json!("test-value")),
                Some("number") | Some("integer") => json!(1),
                Some("boolean") => json!(true),
                Some("array") => json!([]),
                Some("object") => json!({}),
                _ => Value::Null,
            },
        };
        input.insert(field.clone(), value);
    }
    input
}

/// Hook and helper scripts under `hooks/` and `scripts/`, relative to
/// `plugin_root`, sorted.
pub fn find_hook_scripts(plugin_root: &Path) -> Vec<String> {
    let mut scripts = Vec::new();
    for dir in SCRIPT_DIRS {
        let root = plugin_root.join(dir);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Ok(relative) = entry.path().strip_prefix(plugin_root) {
                scripts.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    scripts.sort();
    scripts
}

/// One `file-exists` validate test per discovered script.
pub fn generate_plugin_tests(plugin_root: &Path) -> Vec<PthTest> {
    find_hook_scripts(plugin_root)
        .into_iter()
        .map(|script| {
            let mut test = PthTest::new(
                slugify(&format!("validate_{script}")),
                format!("{script} exists and is readable"),
                TestMode::Plugin,
                TestType::Validate,
            );
            test.checks = vec![ValidateCheck {
                check_type: CheckType::FileExists,
                file: None,
                files: vec![script],
            }];
            test.generated_from = Some(GeneratedFrom::SourceAnalysis);
            test
        })
        .collect()
}

pub fn tools_cache_path(workspace: &Path) -> PathBuf {
    workspace.join(TOOLS_CACHE_FILE)
}

pub fn read_tools_cache(workspace: &Path) -> Result<Vec<ToolSchema>> {
    let path = tools_cache_path(workspace);
    match read_optional(&path)? {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| HarnessError::storage(&path, "malformed tools cache", e)),
    }
}

pub fn write_tools_cache(workspace: &Path, schemas: &[ToolSchema]) -> Result<()> {
    let path = tools_cache_path(workspace);
    let json = serde_json::to_string_pretty(schemas)
        .map_err(|e| HarnessError::storage(&path, "failed to serialize tools cache", e))?;
    write_atomic(&path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn schemas() -> Vec<ToolSchema> {
        serde_json::from_value(json!([
            {
                "name": "call_service",
                "description": "Call a service",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "domain": {"type": "string", "enum": ["light", "switch"]},
                        "service": {"type": "string"},
                        "count": {"type": "integer"},
                        "force": {"type": "boolean"},
                        "targets": {"type": "array"},
                        "data": {"type": "object"},
                        "optional": {"type": "string"}
                    },
                    "required": ["domain", "service", "count", "force", "targets", "data"]
                }
            },
            {"name": "ping"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_generates_valid_and_missing_tests() {
        let tests = generate_mcp_tests(&schemas());
        let ids: Vec<&str> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["call_service_valid_input", "call_service_missing_required", "ping_valid_input"]
        );

        let valid = &tests[0];
        assert_eq!(valid.expect.success, Some(true));
        assert_eq!(valid.timeout_seconds, Some(10));
        assert_eq!(valid.generated_from, Some(GeneratedFrom::Schema));
        assert_eq!(
            valid.input.as_ref().unwrap(),
            &json!({
                "domain": "light",
                "service": "test-value",
                "count": 1,
                "force": true,
                "targets": [],
                "data": {}
            })
        );

        let missing = &tests[1];
        assert_eq!(missing.expect.success, Some(false));
        assert!(missing.input.as_ref().unwrap().get("domain").is_none());
        assert!(missing.name.contains("\"domain\""));

        assert_eq!(tests[2].input.as_ref().unwrap(), &json!({}));
    }

    #[test]
    fn test_plugin_tests_from_scripts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("hooks/nested")).unwrap();
        fs::create_dir_all(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("hooks/pre-tool.sh"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("hooks/nested/post.py"), "").unwrap();
        fs::write(dir.path().join("scripts/setup.sh"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let tests = generate_plugin_tests(dir.path());
        let ids: Vec<&str> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "validate_hooks_nested_post_py",
                "validate_hooks_pre_tool_sh",
                "validate_scripts_setup_sh"
            ]
        );
        assert_eq!(tests[1].checks[0].files, vec!["hooks/pre-tool.sh".to_string()]);
        assert_eq!(tests[1].generated_from, Some(GeneratedFrom::SourceAnalysis));
    }

    #[test]
    fn test_tools_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        assert!(read_tools_cache(dir.path()).unwrap().is_empty());
        write_tools_cache(dir.path(), &schemas()).unwrap();
        assert_eq!(read_tools_cache(dir.path()).unwrap(), schemas());
    }
}
