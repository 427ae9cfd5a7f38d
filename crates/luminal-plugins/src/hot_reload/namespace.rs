//! Loaded-module bookkeeping.
//!
//! Every successful load records its module under the canonical module
//! name and one `module.Unit` entry per registered unit. Handles remove
//! their own entries when stopped; reloads snapshot them so a failed reload
//! can put them back.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

/// `child` equals `parent` or lives below it in dotted notation.
pub fn is_submodule(parent: &str, child: &str) -> bool {
    parent == child
        || child
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// One module-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub filepath: PathBuf,
    pub namespace: String,
    /// Units registered from this module.
    pub units: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl ModuleRecord {
    pub fn new(
        name: impl Into<String>,
        filepath: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            filepath: filepath.into(),
            namespace: namespace.into(),
            units: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn with_units(mut self, units: Vec<String>) -> Self {
        self.units = units;
        self
    }

    /// Fully qualified name, namespace included.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Name-keyed table of loaded modules, owned by one loader.
#[derive(Debug, Default)]
pub struct ModuleTable {
    entries: RwLock<HashMap<String, ModuleRecord>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ModuleRecord) -> Option<ModuleRecord> {
        self.entries.write().insert(record.name.clone(), record)
    }

    /// Record `record` and a `name.Unit` entry for each of its units.
    pub fn insert_module(&self, record: ModuleRecord) {
        let mut entries = self.entries.write();
        for unit in &record.units {
            let mut child = record.clone();
            child.name = format!("{}.{unit}", record.name);
            entries.insert(child.name.clone(), child);
        }
        entries.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<ModuleRecord> {
        self.entries.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted entry names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Entries owned by `name`: the exact match and its dotted children.
    pub fn snapshot_owned(&self, name: &str) -> Vec<ModuleRecord> {
        self.entries
            .read()
            .iter()
            .filter(|(key, _)| is_submodule(name, key))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Remove the entries owned by `name` and return them.
    pub fn remove_owned(&self, name: &str) -> Vec<ModuleRecord> {
        let mut entries = self.entries.write();
        let owned: Vec<String> = entries
            .keys()
            .filter(|key| is_submodule(name, key))
            .cloned()
            .collect();
        owned
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .collect()
    }

    /// Put previously snapshotted entries back.
    pub fn restore(&self, records: Vec<ModuleRecord>) {
        let mut entries = self.entries.write();
        for record in records {
            entries.insert(record.name.clone(), record);
        }
    }
}
