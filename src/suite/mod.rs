//! Test Store: declarative test definitions, their YAML documents and
//! generated proposals.

pub mod generator;
pub mod parser;
pub mod store;
pub mod types;

pub use generator::{
    generate_mcp_tests, generate_plugin_tests, read_tools_cache, write_tools_cache, ToolSchema,
};
pub use parser::{is_slug, load_tests_from_dir, parse_test, parse_tests, slugify};
pub use store::{MergeSummary, TestStore};
pub use types::{ExpectBlock, GeneratedFrom, PthTest, TestMode, TestType};
