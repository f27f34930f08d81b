//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::context::CancellationToken;
use crate::retry::RetryPolicy;

/// Attribute map used for configuration payloads and provider outputs
pub type Attributes = BTreeMap<String, Value>;

/// Pseudo-resource name used to reference deployment configuration keys
pub const CONFIG_RESOURCE: &str = "config";

/// A configuration value
///
/// Values are plain data except for [`Value::Ref`], which points at an
/// attribute of another resource and is resolved once that resource has
/// been provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(ResourceReference),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Shorthand for a reference value
    pub fn reference(resource: &str, attribute: &str) -> Self {
        Self::Ref(ResourceReference::new(resource, attribute))
    }

    /// Collect every reference contained in this value, depth-first
    pub fn references(&self) -> Vec<&ResourceReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a ResourceReference>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// Whether the value contains no references
    pub fn is_literal(&self) -> bool {
        self.references().is_empty()
    }

    /// Rebuild the value, replacing every reference through `resolve`
    ///
    /// Returns `Ok(None)` as soon as `resolve` reports an unknown value.
    pub fn try_map_refs<E, F>(&self, resolve: &mut F) -> Result<Option<Self>, E>
    where
        F: FnMut(&ResourceReference) -> Result<Option<Self>, E>,
    {
        Ok(match self {
            Self::Ref(r) => resolve(r)?,
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.try_map_refs(resolve)? {
                        Some(v) => out.push(v),
                        None => return Ok(None),
                    }
                }
                Some(Self::List(out))
            }
            Self::Map(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    match v.try_map_refs(resolve)? {
                        Some(v) => {
                            out.insert(k.clone(), v);
                        }
                        None => return Ok(None),
                    }
                }
                Some(Self::Map(out))
            }
            other => Some(other.clone()),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Ref(r) => write!(f, "${{{r}}}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<ResourceReference> for Value {
    fn from(r: ResourceReference) -> Self {
        Self::Ref(r)
    }
}

/// A pointer to an output attribute of another resource
///
/// Serialized as `{"$ref": "resource.attribute"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RefRepr", into = "RefRepr")]
pub struct ResourceReference {
    pub resource: String,
    pub attribute: String,
}

impl ResourceReference {
    pub fn new(resource: &str, attribute: &str) -> Self {
        Self {
            resource: resource.to_string(),
            attribute: attribute.to_string(),
        }
    }

    /// Parse "resource.attribute"
    pub fn parse(target: &str) -> Option<Self> {
        let (resource, attribute) = target.split_once('.')?;
        if resource.is_empty() || attribute.is_empty() || attribute.contains('.') {
            return None;
        }
        Some(Self::new(resource, attribute))
    }

    /// Whether this reference points at deployment configuration
    pub fn is_config(&self) -> bool {
        self.resource == CONFIG_RESOURCE
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

#[derive(Serialize, Deserialize)]
struct RefRepr {
    #[serde(rename = "$ref")]
    target: String,
}

impl TryFrom<RefRepr> for ResourceReference {
    type Error = String;

    fn try_from(repr: RefRepr) -> Result<Self, Self::Error> {
        Self::parse(&repr.target).ok_or_else(|| format!("invalid reference: {}", repr.target))
    }
}

impl From<ResourceReference> for RefRepr {
    fn from(r: ResourceReference) -> Self {
        Self {
            target: r.to_string(),
        }
    }
}

/// A declared resource: what should exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Logical name, unique within a deployment
    pub name: String,
    /// Provider-defined type tag
    pub kind: String,
    /// Desired configuration
    #[serde(default)]
    pub config: Attributes,
    /// Explicit ordering constraints on top of reference edges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceDeclaration {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            config: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    /// Set a configuration field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Add an explicit dependency
    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends_on.push(name.to_string());
        self
    }

    /// All references in the configuration, in key order
    pub fn references(&self) -> Vec<&ResourceReference> {
        self.config.values().flat_map(Value::references).collect()
    }
}

/// Deployment-wide settings shared by every declaration
///
/// Declarations read these through `config.<key>` references, which the
/// graph builder substitutes before any planning happens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub values: Attributes,
}

impl DeploymentConfig {
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            ..Default::default()
        }
    }

    /// Look up a configuration key
    pub fn lookup(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "location" if !self.location.is_empty() => Some(Value::String(self.location.clone())),
            "subscription_id" => self.subscription_id.clone().map(Value::String),
            _ => self.values.get(key).cloned(),
        }
    }
}

/// Final status of a resource after execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyResult {
    /// Nothing to do
    NoChange,
    Created,
    Updated,
    Replaced,
    Deleted,
    /// A provider call failed
    Failed { error: String },
    /// Never attempted
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Replaced | Self::Deleted
        )
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Deleted => self.deleted += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Per-resource line of an apply report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub name: String,
    pub kind: String,
    #[serde(flatten)]
    pub result: ApplyResult,
}

/// Outcome of executing a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    /// One entry per planned resource, in plan order
    pub outcomes: Vec<ResourceOutcome>,
    pub summary: ExecuteSummary,
    /// Serial of the snapshot written after execution, if one was written
    pub serial: Option<u64>,
}

impl ApplyReport {
    pub(crate) fn push(&mut self, outcome: ResourceOutcome) {
        self.summary.add_result(&outcome.result);
        self.outcomes.push(outcome);
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_change())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, ApplyResult::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, ApplyResult::Skipped { .. }))
    }

    /// Look up the outcome for a resource
    pub fn outcome(&self, name: &str) -> Option<&ApplyResult> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.result)
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just report what would happen
    pub dry_run: bool,
    /// Size of the worker pool
    pub jobs: usize,
    /// Backoff policy for transient provider errors
    pub retry: RetryPolicy,
    /// Delay between polls of a long-running provider operation
    pub poll_interval: Duration,
    /// Give up on a single long-running operation after this long
    pub operation_timeout: Duration,
    /// Stops scheduling when triggered
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(30 * 60),
            cancel: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_parse() {
        let r = ResourceReference::parse("vnet.name").unwrap();
        assert_eq!(r.resource, "vnet");
        assert_eq!(r.attribute, "name");
        assert!(ResourceReference::parse("vnet").is_none());
        assert!(ResourceReference::parse(".name").is_none());
        assert!(ResourceReference::parse("a.b.c").is_none());
    }

    #[test]
    fn test_nested_references_are_collected() {
        let value = Value::List(vec![Value::Map(BTreeMap::from([
            ("id".to_string(), Value::reference("subnet", "id")),
            ("name".to_string(), Value::from("x")),
        ]))]);
        let refs = value.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].to_string(), "subnet.id");
        assert!(!value.is_literal());
    }

    #[test]
    fn test_reference_json_form() {
        let value = Value::reference("rg", "name");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"$ref":"rg.name"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);

        let map: Value = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert!(matches!(map, Value::Map(_)));
    }

    #[test]
    fn test_try_map_refs_short_circuits_on_unknown() {
        let value = Value::List(vec![Value::from("a"), Value::reference("x", "id")]);
        let mut unknown = |_: &ResourceReference| Ok::<_, ()>(None);
        assert_eq!(value.try_map_refs(&mut unknown), Ok(None));

        let mut known = |r: &ResourceReference| Ok::<_, ()>(Some(Value::String(r.to_string())));
        assert_eq!(
            value.try_map_refs(&mut known),
            Ok(Some(Value::List(vec![Value::from("a"), Value::from("x.id")])))
        );
    }

    #[test]
    fn test_config_lookup() {
        let mut config = DeploymentConfig::new("demo", "eastus");
        config
            .values
            .insert("repo_url".into(), Value::from("https://example.com"));
        assert_eq!(config.lookup("location"), Some(Value::from("eastus")));
        assert_eq!(config.lookup("repo_url"), Some(Value::from("https://example.com")));
        assert_eq!(config.lookup("subscription_id"), None);
        assert_eq!(config.lookup("missing"), None);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Replaced);
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });
        summary.add_result(&ApplyResult::NoChange);
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }
}
