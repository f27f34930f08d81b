//! Project file (`cirrus.toml`) schema and loading
//!
//! ```toml
//! [deployment]
//! name = "demo"
//! location = "eastus"
//!
//! [execution]
//! jobs = 4
//!
//! [[resource]]
//! name = "vnet"
//! kind = "azure-native:network:VirtualNetwork"
//! depends_on = []
//! [resource.config]
//! resourceGroupName = "${resourceGroup.name}"
//! location = "${config.location}"
//! ```
//!
//! A string of the exact form `${resource.attribute}` is a reference;
//! anything else is a literal.

use anyhow::{Context, Result};
use declarative::{
    Attributes, DependencyGraph, DeploymentConfig, ExecuteOptions, FileStateStore, GraphBuilder,
    ResourceDeclaration, ResourceReference, RetryPolicy, Value,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::paths;

/// `${resource.attribute}`
static REFERENCE_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_]*)\}$")
        .expect("Invalid reference regex")
});

// ============================================================================
// File Schema
// ============================================================================

/// Top-level layout of `cirrus.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub deployment: DeploymentSection,

    #[serde(default)]
    pub execution: ExecutionSection,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
}

/// `[deployment]`: values shared by every resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSection {
    pub name: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Extra keys readable as `${config.<key>}`
    #[serde(default)]
    pub values: toml::Table,
}

/// `[execution]`: executor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub jobs: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_backoff_factor: f64,
    pub poll_interval_ms: u64,
    pub operation_timeout_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            jobs: 4,
            max_attempts: retry.max_attempts,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
            retry_backoff_factor: retry.backoff_factor,
            poll_interval_ms: 500,
            operation_timeout_secs: 30 * 60,
        }
    }
}

/// One `[[resource]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub config: toml::Table,
}

// ============================================================================
// Loaded Project
// ============================================================================

/// A parsed project, ready to build a graph from
#[derive(Debug, Clone)]
pub struct Project {
    pub path: PathBuf,
    pub deployment: DeploymentConfig,
    pub execution: ExecutionSection,
    pub declarations: Vec<ResourceDeclaration>,
}

impl Project {
    /// Load and convert a project file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read project file: {}", path.display()))?;
        Self::parse(&content, path)
    }

    /// Parse project file content; `path` is only used for locating state
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: ProjectFile = toml::from_str(content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;

        let deployment = DeploymentConfig {
            name: file.deployment.name,
            location: file.deployment.location,
            subscription_id: file.deployment.subscription_id,
            values: convert_table(&file.deployment.values),
        };

        let declarations = file
            .resources
            .into_iter()
            .map(|entry| ResourceDeclaration {
                config: convert_table(&entry.config),
                name: entry.name,
                kind: entry.kind,
                depends_on: entry.depends_on,
            })
            .collect();

        log::debug!(
            "Loaded project '{}' from {}",
            deployment.name,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            deployment,
            execution: file.execution,
            declarations,
        })
    }

    /// Directory containing the project file
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Build and validate the dependency graph
    pub fn graph(&self) -> Result<DependencyGraph> {
        let graph = GraphBuilder::new(&self.deployment).build(self.declarations.clone())?;
        Ok(graph)
    }

    /// Where this deployment's state snapshot lives
    pub fn state_path(&self) -> PathBuf {
        paths::state_file(self.dir(), &self.deployment.name)
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state_path())
    }

    /// Executor options from `[execution]`, with an optional jobs override
    pub fn execute_options(&self, jobs: Option<usize>) -> ExecuteOptions {
        let exec = &self.execution;
        ExecuteOptions {
            jobs: jobs.unwrap_or(exec.jobs).max(1),
            retry: RetryPolicy {
                max_attempts: exec.max_attempts.max(1),
                base_delay: Duration::from_millis(exec.retry_base_delay_ms),
                backoff_factor: exec.retry_backoff_factor.max(1.0),
                max_delay: Duration::from_millis(exec.retry_max_delay_ms),
            },
            poll_interval: Duration::from_millis(exec.poll_interval_ms),
            operation_timeout: Duration::from_secs(exec.operation_timeout_secs),
            ..ExecuteOptions::default()
        }
    }
}

// ============================================================================
// TOML -> Value
// ============================================================================

fn convert_table(table: &toml::Table) -> Attributes {
    table
        .iter()
        .map(|(k, v)| (k.clone(), convert_value(v)))
        .collect()
}

/// Convert a TOML value, turning `${a.b}` strings into references
pub fn convert_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => parse_reference(s).map_or_else(|| Value::from(s.as_str()), Value::Ref),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(convert_value).collect()),
        toml::Value::Table(t) => Value::Map(convert_table(t)),
    }
}

/// Parse `${resource.attribute}`
pub fn parse_reference(s: &str) -> Option<ResourceReference> {
    let caps = REFERENCE_REGEX.captures(s)?;
    Some(ResourceReference::new(&caps[1], &caps[2]))
}
