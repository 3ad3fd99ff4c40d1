use crate::error::{HarnessError, Result};
use crate::storage::{remove_if_exists, write_atomic};
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{PthTest, TestMode};

pub const MCP_TESTS_FILE: &str = "mcp-tests.yaml";
pub const PLUGIN_TESTS_FILE: &str = "plugin-tests.yaml";

/// Counts from [`TestStore::merge`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
}

/// Canonical test definitions for a session, keyed by id and iterated in id
/// order.
#[derive(Debug, Default, Clone)]
pub struct TestStore {
    tests: BTreeMap<String, PthTest>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict insert. An existing id is an error.
    pub fn add(&mut self, test: PthTest) -> Result<()> {
        if self.tests.contains_key(&test.id) {
            return Err(HarnessError::InvalidTest(format!(
                "test with id \"{}\" already exists",
                test.id
            )));
        }
        self.tests.insert(test.id.clone(), test);
        Ok(())
    }

    /// Upsert. Returns true when a record was replaced.
    pub fn update(&mut self, test: PthTest) -> bool {
        self.tests.insert(test.id.clone(), test).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tests.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PthTest> {
        self.tests.get(id)
    }

    pub fn get_all(&self) -> Vec<&PthTest> {
        self.tests.values().collect()
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&PthTest>
    where
        P: Fn(&PthTest) -> bool,
    {
        self.tests.values().filter(|t| predicate(t)).collect()
    }

    pub fn count(&self) -> usize {
        self.tests.len()
    }

    /// Upsert every test, choosing add or update by probing the id first.
    pub fn merge(&mut self, tests: impl IntoIterator<Item = PthTest>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for test in tests {
            if self.contains(&test.id) {
                self.update(test);
                summary.updated += 1;
            } else {
                self.tests.insert(test.id.clone(), test);
                summary.added += 1;
            }
        }
        summary
    }

    /// Write one multi-document YAML file per mode. A mode with no tests has
    /// its file removed so deleted groups do not reappear on reload.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        for (mode, file) in [
            (TestMode::Mcp, MCP_TESTS_FILE),
            (TestMode::Plugin, PLUGIN_TESTS_FILE),
        ] {
            let path = dir.join(file);
            let group = self.filter(|t| t.mode == mode);
            if group.is_empty() {
                remove_if_exists(&path)?;
                continue;
            }
            let mut documents = Vec::with_capacity(group.len());
            for test in group {
                let yaml = serde_yaml::to_string(test).map_err(|e| {
                    HarnessError::storage(&path, format!("failed to serialize test {}", test.id), e)
                })?;
                documents.push(yaml);
            }
            write_atomic(&path, documents.join("---\n").as_bytes())?;
        }
        tracing::debug!("Persisted {} tests to {}", self.count(), dir.display());
        Ok(())
    }
}
