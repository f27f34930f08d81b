//! Execution planner - diffs declarations against the last snapshot
//!
//! The planner walks the graph in topological order. References are resolved
//! against what will be known at apply time: resources that stay in place
//! expose their declared config and recorded outputs, while resources being
//! created or replaced only expose their literal config. Anything else is
//! unknown until apply.

use crate::diff::{FieldChange, PlannedConfig, PlannedValue, diff_fields};
use crate::error::{Error, OperationKind, Result};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::provider::{KindSchema, Provider};
use crate::state::{ResourceRecord, StateSnapshot};
use crate::types::{DeploymentConfig, ResourceDeclaration, ResourceReference, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::convert::Infallible;
use std::fmt;

/// What happens to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Update,
    /// Delete, then create again
    Replace,
    Delete,
}

impl Action {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Planned change for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub name: String,
    pub kind: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Declared dependencies, or the recorded ones for deletes
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<ResourceDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<ResourceRecord>,
}

/// Provider call a step makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Create,
    Update,
    Delete,
}

impl StepKind {
    pub fn operation(&self) -> OperationKind {
        match self {
            Self::Create => OperationKind::Create,
            Self::Update => OperationKind::Update,
            Self::Delete => OperationKind::Delete,
        }
    }
}

/// A single executable unit of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub resource: String,
    pub kind: StepKind,
    /// Half of a replacement
    pub replacing: bool,
    /// Steps that must succeed first; always lower indices
    pub predecessors: Vec<usize>,
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            StepKind::Create => "create",
            StepKind::Update => "update",
            StepKind::Delete => "delete",
        };
        write!(f, "{verb} {}", self.resource)
    }
}

/// Counts of planned actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_op: usize,
}

impl PlanSummary {
    pub fn total_changes(&self) -> usize {
        self.create + self.update + self.replace + self.delete
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_op
        )
    }
}

/// An ordered plan of operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// One entry per resource: declared ones in topological order, then deletes
    pub changes: Vec<ResourceChange>,
    /// Executable steps; deletes (dependents first) then creates and updates
    pub steps: Vec<PlanStep>,
    /// Serial of the snapshot this plan was computed against
    pub prior_serial: u64,
    /// Checksum of the snapshot this plan was computed against
    pub prior_checksum: String,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.action {
                Action::NoOp => summary.no_op += 1,
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Replace => summary.replace += 1,
                Action::Delete => summary.delete += 1,
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn change(&self, name: &str) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| c.name == name)
    }

    /// Action planned for a resource, if it appears in the plan
    pub fn action(&self, name: &str) -> Option<Action> {
        self.change(name).map(|c| c.action)
    }

    /// Machine-readable rendering
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in self.changes.iter().filter(|c| c.action.is_change()) {
            write!(f, "{:>3} {} ({})", change.action.symbol(), change.name, change.kind)?;
            if let Some(reason) = &change.reason {
                write!(f, "  # {reason}")?;
            }
            writeln!(f)?;
            for fc in &change.changes {
                let before = fc.before.as_ref().map_or("(none)".to_string(), Value::to_string);
                let after = fc
                    .after
                    .as_ref()
                    .map_or("(removed)".to_string(), PlannedValue::to_string);
                let marker = if fc.forces_replacement {
                    " (forces replacement)"
                } else {
                    ""
                };
                writeln!(f, "      {}: {} -> {}{}", fc.field, before, after, marker)?;
            }
        }
        write!(f, "Plan: {}", self.summary())
    }
}

/// What later resources may learn about an already-planned one
struct Knowledge<'a> {
    config: PlannedConfig,
    /// Present when the resource keeps its identity through the apply
    record: Option<&'a ResourceRecord>,
}

fn lookup(knowledge: &HashMap<&str, Knowledge<'_>>, r: &ResourceReference) -> Option<Value> {
    let k = knowledge.get(r.resource.as_str())?;
    if let Some(v) = k.config.get(&r.attribute) {
        return v.known().cloned();
    }
    k.record.and_then(|rec| rec.attribute(&r.attribute))
}

fn resolve_planned(value: &Value, knowledge: &HashMap<&str, Knowledge<'_>>) -> PlannedValue {
    let resolved: std::result::Result<Option<Value>, Infallible> =
        value.try_map_refs(&mut |r: &ResourceReference| Ok(lookup(knowledge, r)));
    match resolved {
        Ok(v) => PlannedValue::from(v),
        Err(never) => match never {},
    }
}

fn schema_for<'p>(provider: &'p dyn Provider, decl: &ResourceDeclaration) -> Result<&'p KindSchema> {
    provider.schema(&decl.kind).ok_or_else(|| Error::UnknownKind {
        resource: decl.name.clone(),
        kind: decl.kind.clone(),
    })
}

/// Check kinds and referenced attributes against the provider schemas
fn validate(graph: &DependencyGraph, provider: &dyn Provider) -> Result<()> {
    for decl in graph.ordered() {
        schema_for(provider, decl)?;
    }

    for decl in graph.ordered() {
        for r in decl.references() {
            let Some(target) = graph.get(&r.resource) else {
                return Err(Error::UnknownReference {
                    resource: decl.name.clone(),
                    target: format!("resource '{}'", r.resource),
                });
            };
            let schema = schema_for(provider, target)?;
            if !target.config.contains_key(&r.attribute) && !schema.has_output(&r.attribute) {
                return Err(Error::UnknownReference {
                    resource: decl.name.clone(),
                    target: format!(
                        "attribute '{}' of '{}' ({})",
                        r.attribute, target.name, target.kind
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Declared resources with a prior record that must be replaced along with `name`
///
/// Follows both declared and recorded dependency edges, since the provider
/// will refuse to delete something an existing resource still points at.
fn replacement_cascade<'g>(
    name: &str,
    graph: &'g DependencyGraph,
    prior: &StateSnapshot,
) -> Vec<&'g str> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([name.to_string()]);

    while let Some(current) = queue.pop_front() {
        let next = graph
            .dependents(&current)
            .into_iter()
            .map(str::to_string)
            .chain(prior.dependents_of(&current).into_iter().map(str::to_string));
        for dependent in next {
            if dependent != name && seen.insert(dependent.clone()) {
                queue.push_back(dependent);
            }
        }
    }

    graph
        .ordered()
        .map(|d| d.name.as_str())
        .filter(|n| seen.contains(*n) && prior.contains(n))
        .collect()
}

/// One topological walk over the declarations
///
/// Cascades from replacements are added to `forced`; an entry for a resource
/// already walked past only takes effect on the next walk.
fn plan_declared<'g>(
    graph: &'g DependencyGraph,
    prior: &StateSnapshot,
    provider: &dyn Provider,
    forced: &mut HashMap<&'g str, String>,
) -> Result<Vec<ResourceChange>> {
    let mut knowledge: HashMap<&str, Knowledge<'_>> = HashMap::with_capacity(graph.len());
    let mut changes = Vec::with_capacity(graph.len() + prior.len());

    for decl in graph.ordered() {
        let schema = schema_for(provider, decl)?;
        let desired: PlannedConfig = decl
            .config
            .iter()
            .map(|(k, v)| (k.clone(), resolve_planned(v, &knowledge)))
            .collect();
        let record = prior.get(&decl.name);

        let (action, field_changes, reason) = match record {
            None => (Action::Create, Vec::new(), None),
            Some(rec) => {
                let field_changes = diff_fields(&rec.config, &desired, |f| schema.is_immutable(f));
                if let Some(reason) = forced.get(decl.name.as_str()) {
                    (Action::Replace, field_changes, Some(reason.clone()))
                } else if rec.kind != decl.kind {
                    let reason = format!("kind changed from {} to {}", rec.kind, decl.kind);
                    (Action::Replace, field_changes, Some(reason))
                } else if field_changes.is_empty() {
                    (Action::NoOp, field_changes, None)
                } else if let Some(fc) = field_changes.iter().find(|c| c.forces_replacement) {
                    let reason = format!("{} cannot be changed in place", fc.field);
                    (Action::Replace, field_changes, Some(reason))
                } else {
                    (Action::Update, field_changes, None)
                }
            }
        };

        if action == Action::Replace {
            for dependent in replacement_cascade(&decl.name, graph, prior) {
                forced
                    .entry(dependent)
                    .or_insert_with(|| format!("depends on {}, which is being replaced", decl.name));
            }
        }

        log::debug!(
            "Planned {} for {} ({} field changes)",
            action,
            decl.name,
            field_changes.len()
        );

        knowledge.insert(
            &decl.name,
            Knowledge {
                config: desired,
                record: record.filter(|_| matches!(action, Action::NoOp | Action::Update)),
            },
        );

        changes.push(ResourceChange {
            name: decl.name.clone(),
            kind: decl.kind.clone(),
            action,
            changes: field_changes,
            reason,
            dependencies: graph.dependencies(&decl.name).into_iter().map(str::to_string).collect(),
            declaration: Some(decl.clone()),
            prior: record.cloned(),
        });
    }

    Ok(changes)
}

/// Compute the plan that converges `prior` to the declarations in `graph`
///
/// Fails before any provider call if a kind is unknown or a reference points
/// at an attribute the target resource will never have.
pub fn plan(graph: &DependencyGraph, prior: &StateSnapshot, provider: &dyn Provider) -> Result<Plan> {
    validate(graph, provider)?;

    // A recorded dependent may sort ahead of the resource it still points at,
    // so walk again until every forced replacement has been planned as one.
    let mut forced: HashMap<&str, String> = HashMap::new();
    let mut changes = loop {
        let changes = plan_declared(graph, prior, provider, &mut forced)?;
        let settled = changes
            .iter()
            .all(|c| c.action == Action::Replace || !forced.contains_key(c.name.as_str()));
        if settled {
            break changes;
        }
        log::debug!("Replacement cascade reached already planned resources, replanning");
    };

    for name in prior.dependency_order().into_iter().rev() {
        if graph.contains(name) {
            continue;
        }
        let Some(rec) = prior.get(name) else {
            continue;
        };
        log::debug!("Planned delete for {name} (no longer declared)");
        changes.push(ResourceChange {
            name: name.to_string(),
            kind: rec.kind.clone(),
            action: Action::Delete,
            changes: Vec::new(),
            reason: Some("no longer declared".to_string()),
            dependencies: rec.dependencies.clone(),
            declaration: None,
            prior: Some(rec.clone()),
        });
    }

    let steps = build_steps(&changes, prior);
    let plan = Plan {
        changes,
        steps,
        prior_serial: prior.serial,
        prior_checksum: prior.checksum(),
    };
    log::info!("Plan: {}", plan.summary());
    Ok(plan)
}

/// Plan the removal of everything in `prior`
pub fn plan_destroy(prior: &StateSnapshot, provider: &dyn Provider) -> Result<Plan> {
    let empty = GraphBuilder::new(&DeploymentConfig::default()).build(Vec::new())?;
    plan(&empty, prior, provider)
}

/// Flatten changes into steps with explicit predecessors
///
/// Deletes come first, walking recorded dependencies backwards so that a
/// resource is removed only after everything that pointed at it. Creates and
/// updates follow in topological order; a replacement's create waits for its
/// own delete.
fn build_steps(changes: &[ResourceChange], prior: &StateSnapshot) -> Vec<PlanStep> {
    let action_of: HashMap<&str, Action> =
        changes.iter().map(|c| (c.name.as_str(), c.action)).collect();
    let mut steps = Vec::new();

    let mut delete_steps: HashMap<&str, usize> = HashMap::new();
    for name in prior.dependency_order().into_iter().rev() {
        let action = match action_of.get(name) {
            Some(a @ (Action::Delete | Action::Replace)) => *a,
            _ => continue,
        };
        let mut predecessors: Vec<usize> = prior
            .dependents_of(name)
            .into_iter()
            .filter_map(|d| delete_steps.get(d).copied())
            .collect();
        predecessors.sort_unstable();
        delete_steps.insert(name, steps.len());
        steps.push(PlanStep {
            resource: name.to_string(),
            kind: StepKind::Delete,
            replacing: action == Action::Replace,
            predecessors,
        });
    }

    let mut apply_steps: HashMap<&str, usize> = HashMap::new();
    for change in changes {
        let kind = match change.action {
            Action::Create | Action::Replace => StepKind::Create,
            Action::Update => StepKind::Update,
            Action::NoOp | Action::Delete => continue,
        };
        let mut predecessors: Vec<usize> = change
            .dependencies
            .iter()
            .filter_map(|d| apply_steps.get(d.as_str()).copied())
            .collect();
        if change.action == Action::Replace
            && let Some(&delete) = delete_steps.get(change.name.as_str())
        {
            predecessors.push(delete);
        }
        predecessors.sort_unstable();
        predecessors.dedup();
        apply_steps.insert(&change.name, steps.len());
        steps.push(PlanStep {
            resource: change.name.clone(),
            kind,
            replacing: change.action == Action::Replace,
            predecessors,
        });
    }

    steps
}
