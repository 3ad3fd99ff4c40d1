use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Execution style of the plugin under repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginMode {
    /// Interactive tool server configured via `.mcp.json`.
    Mcp,
    /// Hook/script plugin with a `.claude-plugin/` directory.
    Plugin,
}

impl PluginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginMode::Mcp => "mcp",
            PluginMode::Plugin => "plugin",
        }
    }
}

impl fmt::Display for PluginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Typescript,
    Python,
    Shell,
    Unknown,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Shell => "shell",
            Language::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// How to install, build and start a plugin. Commands are argv vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSystem {
    pub install_command: Option<Vec<String>>,
    pub build_command: Option<Vec<String>>,
    pub start_command: Option<Vec<String>>,
    pub language: Language,
}

impl BuildSystem {
    fn none(language: Language) -> Self {
        Self {
            install_command: None,
            build_command: None,
            start_command: None,
            language,
        }
    }

    pub fn describe(&self) -> String {
        let render = |cmd: &Option<Vec<String>>| {
            cmd.as_ref()
                .map(|argv| argv.join(" "))
                .unwrap_or_else(|| "none".to_string())
        };
        format!(
            "{} (install: {}, build: {})",
            self.language,
            render(&self.install_command),
            render(&self.build_command)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    pub server_name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub mode: PluginMode,
    pub name: String,
    pub source_path: PathBuf,
    pub build: BuildSystem,
    pub mcp_config: Option<McpConfig>,
}

/// Detect everything needed to start a session against `path`.
pub fn detect_plugin(path: &Path) -> Result<PluginInfo> {
    let mode = detect_plugin_mode(path)?;
    let mcp_config = match mode {
        PluginMode::Mcp => read_mcp_config(path)?,
        PluginMode::Plugin => None,
    };
    Ok(PluginInfo {
        mode,
        name: detect_plugin_name(path),
        source_path: path.to_path_buf(),
        build: detect_build_system(path),
        mcp_config,
    })
}

pub fn detect_plugin_mode(path: &Path) -> Result<PluginMode> {
    if !path.exists() {
        return Err(HarnessError::PluginNotFound(path.to_path_buf()));
    }
    if path.join(".mcp.json").exists() {
        return Ok(PluginMode::Mcp);
    }
    if path.join(".claude-plugin").exists() {
        return Ok(PluginMode::Plugin);
    }
    Err(HarnessError::InvalidPlugin(format!(
        "Not a valid plugin: no .mcp.json or .claude-plugin/ found at {}",
        path.display()
    )))
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn json_name(path: &Path) -> Option<String> {
    read_json(path)?
        .get("name")?
        .as_str()
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
}

/// Manifest name, then package.json name, then the directory name.
pub fn detect_plugin_name(path: &Path) -> String {
    let manifest_dir = path.join(".claude-plugin");
    json_name(&manifest_dir.join("plugin.json"))
        .or_else(|| json_name(&manifest_dir.join("manifest.json")))
        .or_else(|| json_name(&path.join("package.json")))
        .or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "plugin".to_string())
}

fn argv(parts: &[&str]) -> Option<Vec<String>> {
    Some(parts.iter().map(|s| s.to_string()).collect())
}

pub fn detect_build_system(path: &Path) -> BuildSystem {
    let has = |name: &str| path.join(name).exists();

    if let Some(pkg) = read_json(&path.join("package.json")) {
        let has_build_script = pkg
            .get("scripts")
            .and_then(|scripts| scripts.get("build"))
            .is_some();
        let has_tsconfig = has("tsconfig.json");
        let build_command = if has_build_script {
            argv(&["npm", "run", "build"])
        } else if has_tsconfig {
            argv(&["npx", "tsc"])
        } else {
            None
        };
        let start_command = pkg
            .get("main")
            .and_then(|main| main.as_str())
            .and_then(|main| argv(&["node", main]));
        return BuildSystem {
            install_command: argv(&["npm", "install"]),
            build_command,
            start_command,
            language: if has_tsconfig {
                Language::Typescript
            } else {
                Language::Unknown
            },
        };
    }

    if has("pyproject.toml") || has("setup.py") {
        return BuildSystem {
            install_command: argv(&["pip", "install", "-e", "."]),
            ..BuildSystem::none(Language::Python)
        };
    }

    if has("tsconfig.json") {
        return BuildSystem {
            build_command: argv(&["npx", "tsc"]),
            ..BuildSystem::none(Language::Typescript)
        };
    }

    if has("Makefile") || has("install.sh") {
        return BuildSystem::none(Language::Shell);
    }

    BuildSystem::none(Language::Unknown)
}

/// First server entry of `.mcp.json`. Accepts both the flat
/// `{ "<name>": {...} }` form and the `{ "mcpServers": {...} }` wrapper.
pub fn read_mcp_config(path: &Path) -> Result<Option<McpConfig>> {
    let file = path.join(".mcp.json");
    let raw = match fs::read_to_string(&file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarnessError::storage(&file, "failed to read .mcp.json", e)),
    };

    let invalid = |msg: String| HarnessError::InvalidPlugin(format!("{}: {msg}", file.display()));

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| invalid(format!("failed to parse: {e}")))?;
    let servers = value
        .get("mcpServers")
        .unwrap_or(&value)
        .as_object()
        .ok_or_else(|| invalid("expected an object of server entries".to_string()))?;

    let (server_name, entry) = servers
        .iter()
        .next()
        .ok_or_else(|| invalid("has no server entries".to_string()))?;

    let command = entry
        .get("command")
        .and_then(|c| c.as_str())
        .ok_or_else(|| invalid(format!("server '{server_name}' has no command")))?;
    let args = entry
        .get("args")
        .and_then(|a| a.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let env = entry
        .get("env")
        .and_then(|e| e.as_object())
        .map(|vars| {
            vars.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(McpConfig {
        server_name: server_name.clone(),
        command: command.to_string(),
        args,
        env,
    }))
}
