//! State snapshot and storage
//!
//! The snapshot records what was actually provisioned: the resolved
//! configuration last applied to each resource, the provider id, its output
//! attributes, and the dependencies it had at the time. A serial number and a
//! content checksum let the executor refuse to apply a plan computed against
//! a different snapshot.

use crate::error::{Error, Result};
use crate::types::{Attributes, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// What is known about one provisioned resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    /// Provider-assigned identifier
    pub id: String,
    /// Last-applied configuration, references resolved
    #[serde(default)]
    pub config: Attributes,
    /// Provider-reported output attributes
    #[serde(default)]
    pub outputs: Attributes,
    /// Resources this one depended on when it was applied
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Look up an attribute: applied config first, then outputs, then `id`
    ///
    /// Same precedence the planner uses, so a resolved value recorded at
    /// apply time compares equal on the next plan.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.config.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.outputs.get(name) {
            return Some(v.clone());
        }
        (name == "id").then(|| Value::String(self.id.clone()))
    }
}

/// Mapping from logical name to provisioned record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Incremented on every save after an apply
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, record: ResourceRecord) {
        self.resources.insert(name.to_string(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<ResourceRecord> {
        self.resources.remove(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// blake3 digest of the serialized resources
    ///
    /// Two snapshots with equal checksums hold the same records.
    pub fn checksum(&self) -> String {
        let bytes = serde_json::to_vec(&self.resources).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Record names ordered so each record comes after its recorded dependencies
    ///
    /// Dependencies that are not in the snapshot are ignored. Ties (and any
    /// records caught in a malformed cycle) fall back to name order.
    pub fn dependency_order(&self) -> Vec<&str> {
        let mut placed: Vec<&str> = Vec::with_capacity(self.resources.len());
        let mut pending: Vec<&str> = self.names().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut next = Vec::new();
            for name in pending {
                let ready = self.resources[name]
                    .dependencies
                    .iter()
                    .all(|d| !self.contains(d) || placed.contains(&d.as_str()));
                if ready {
                    placed.push(name);
                } else {
                    next.push(name);
                }
            }
            if next.len() == before {
                placed.extend(next);
                break;
            }
            pending = next;
        }
        placed
    }

    /// Names of records that recorded a dependency on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.dependencies.iter().any(|d| d == name))
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Persists snapshots between runs
pub trait StateStore: Send + Sync {
    /// Load the latest snapshot; an empty snapshot if none was saved yet
    fn load(&self) -> Result<StateSnapshot>;

    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
}

/// In-memory store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<StateSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        match self.snapshot.lock() {
            Ok(s) => Ok(s.clone()),
            Err(poisoned) => Ok(poisoned.into_inner().clone()),
        }
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        match self.snapshot.lock() {
            Ok(mut s) => *s = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        Ok(())
    }
}

/// JSON file store with atomic writes (temp file + rename)
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            log::debug!(
                "State file {} does not exist, starting empty",
                self.path.display()
            );
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::storage(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let snapshot: StateSnapshot = serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        log::debug!(
            "Loaded state serial {} ({} resources) from {}",
            snapshot.serial,
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| Error::storage(format!("failed to serialize state: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(|e| {
            Error::storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        log::debug!(
            "Saved state serial {} to {}",
            snapshot.serial,
            self.path.display()
        );
        Ok(())
    }
}
