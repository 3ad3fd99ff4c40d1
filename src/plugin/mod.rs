//! Plugin collaborators: detection, build, cache sync, reload, and process
//! control.

pub mod build;
pub mod cache_sync;
pub mod detector;
pub mod process;
pub mod reloader;

pub use build::{BuildReport, BuildRunner};
pub use cache_sync::{cache_path, CacheSync, SyncMethod, SyncReport};
pub use detector::{
    detect_build_system, detect_plugin, detect_plugin_mode, detect_plugin_name, read_mcp_config,
    BuildSystem, Language, McpConfig, PluginInfo, PluginMode,
};
pub use process::{find_process, NixProcessControl, ProcessControl, ProcessMatch};
pub use reloader::{ReloadOutcome, Reloader};
