//! Resource graph builder
//!
//! Turns a list of declarations into a validated dependency graph. Edges
//! come from two places: references inside configuration values
//! (`subnet.virtualNetworkName -> vnet.name`) and explicit `depends_on`
//! entries. Declaration order only matters for breaking ties, so the same
//! input always yields the same topological order.

use crate::error::{Error, Result};
use crate::types::{DeploymentConfig, ResourceDeclaration, Value};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Write as _;

/// Validated dependency DAG over declarations
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    declarations: Vec<ResourceDeclaration>,
    index: HashMap<String, usize>,
    /// Dependencies of each node, sorted by declaration index
    dependencies: Vec<Vec<usize>>,
    /// Dependents of each node, sorted by declaration index
    dependents: Vec<Vec<usize>>,
    /// Topological order as declaration indices
    order: Vec<usize>,
}

/// Builds a [`DependencyGraph`] using a deployment configuration
pub struct GraphBuilder<'a> {
    config: &'a DeploymentConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a DeploymentConfig) -> Self {
        Self { config }
    }

    /// Validate declarations and build the graph
    ///
    /// Fails on duplicate names, references to undeclared resources or
    /// unknown config keys, and dependency cycles.
    pub fn build(&self, declarations: Vec<ResourceDeclaration>) -> Result<DependencyGraph> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (i, decl) in declarations.iter().enumerate() {
            if index.insert(decl.name.clone(), i).is_some() {
                return Err(Error::DuplicateResource {
                    name: decl.name.clone(),
                });
            }
        }

        let declarations = declarations
            .into_iter()
            .map(|decl| self.substitute_config(decl))
            .collect::<Result<Vec<_>>>()?;

        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); declarations.len()];
        for (i, decl) in declarations.iter().enumerate() {
            let targets = decl
                .references()
                .into_iter()
                .map(|r| (r.resource.as_str(), format!("resource '{}' in {}", r.resource, r)))
                .chain(
                    decl.depends_on
                        .iter()
                        .map(|d| (d.as_str(), format!("resource '{d}' in depends_on"))),
                );

            for (target, description) in targets {
                if target == decl.name {
                    return Err(Error::Cycle {
                        path: vec![decl.name.clone(), decl.name.clone()],
                    });
                }
                let Some(&dep) = index.get(target) else {
                    return Err(Error::UnknownReference {
                        resource: decl.name.clone(),
                        target: description,
                    });
                };
                dependencies[i].push(dep);
            }
            dependencies[i].sort_unstable();
            dependencies[i].dedup();
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); declarations.len()];
        for (i, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(i);
            }
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(Error::Cycle {
                path: cycle
                    .into_iter()
                    .map(|i| declarations[i].name.clone())
                    .collect(),
            });
        }

        let order = topological_order(&dependencies, &dependents);
        log::debug!(
            "Built dependency graph with {} resources and {} edges",
            declarations.len(),
            dependencies.iter().map(Vec::len).sum::<usize>()
        );

        Ok(DependencyGraph {
            declarations,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    /// Replace `config.*` references with literal values
    fn substitute_config(&self, mut decl: ResourceDeclaration) -> Result<ResourceDeclaration> {
        let name = decl.name.clone();
        let mut substitute = |r: &crate::types::ResourceReference| {
            if !r.is_config() {
                return Ok(Some(Value::Ref(r.clone())));
            }
            match self.config.lookup(&r.attribute) {
                Some(v) => Ok(Some(v)),
                None => Err(Error::UnknownReference {
                    resource: name.clone(),
                    target: format!("config key '{}'", r.attribute),
                }),
            }
        };

        for value in decl.config.values_mut() {
            if value.is_literal() {
                continue;
            }
            if let Some(v) = value.try_map_refs(&mut substitute)? {
                *value = v;
            }
        }
        Ok(decl)
    }
}

/// Depth-first search tracking in-progress nodes
///
/// Returns the cycle as a path whose first and last entries are equal.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        InProgress,
        Done,
    }

    fn visit(
        node: usize,
        dependencies: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::InProgress;
        stack.push(node);
        for &dep in &dependencies[node] {
            match marks[dep] {
                Mark::InProgress => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].to_vec();
                    cycle.push(dep);
                    // Stack runs dependent -> dependency; report in edge direction
                    cycle.reverse();
                    return Some(cycle);
                }
                Mark::New => {
                    if let Some(cycle) = visit(dep, dependencies, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; dependencies.len()];
    let mut stack = Vec::new();
    for node in 0..dependencies.len() {
        if marks[node] == Mark::New
            && let Some(cycle) = visit(node, dependencies, &mut marks, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

/// Kahn's algorithm, always emitting the earliest-declared ready node
fn topological_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }
    order
}

impl DependencyGraph {
    /// Declarations in topological order
    pub fn ordered(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.order.iter().map(|&i| &self.declarations[i])
    }

    /// Declarations in their original order
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Position of a resource in the topological order
    pub fn position(&self, name: &str) -> Option<usize> {
        let i = *self.index.get(name)?;
        self.order.iter().position(|&n| n == i)
    }

    /// Direct dependencies of a resource
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.names(self.index.get(name).map(|&i| &self.dependencies[i]))
    }

    /// Direct dependents of a resource
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.names(self.index.get(name).map(|&i| &self.dependents[i]))
    }

    /// Every resource that directly or indirectly depends on `name`, in topological order
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.declarations.len()];
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dependent in &self.dependents[node] {
                if !seen[dependent] {
                    seen[dependent] = true;
                    stack.push(dependent);
                }
            }
        }
        self.order
            .iter()
            .filter(|&&i| seen[i])
            .map(|&i| self.declarations[i].name.as_str())
            .collect()
    }

    /// All edges as (dependency, dependent), in topological order of the dependent
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .flat_map(|&i| {
                self.dependencies[i].iter().map(move |&dep| {
                    (
                        self.declarations[dep].name.as_str(),
                        self.declarations[i].name.as_str(),
                    )
                })
            })
            .collect()
    }

    /// Render the graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph resources {\n    rankdir=LR;\n");
        for decl in self.ordered() {
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\\n{}\"];",
                decl.name, decl.name, decl.kind
            );
        }
        for (from, to) in self.edges() {
            let _ = writeln!(out, "    \"{from}\" -> \"{to}\";");
        }
        out.push_str("}\n");
        out
    }

    fn names(&self, indices: Option<&Vec<usize>>) -> Vec<&str> {
        indices
            .map(|v| {
                v.iter()
                    .map(|&i| self.declarations[i].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceReference;

    fn config() -> DeploymentConfig {
        DeploymentConfig::new("test", "eastus")
    }

    fn build(decls: Vec<ResourceDeclaration>) -> Result<DependencyGraph> {
        GraphBuilder::new(&config()).build(decls)
    }

    fn names(graph: &DependencyGraph) -> Vec<&str> {
        graph.ordered().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        // Declared in reverse dependency order on purpose
        let graph = build(vec![
            ResourceDeclaration::new("app", "webapp").with("plan", Value::reference("plan", "id")),
            ResourceDeclaration::new("plan", "plan").with("rg", Value::reference("rg", "name")),
            ResourceDeclaration::new("rg", "rg"),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["rg", "plan", "app"]);
        for (dep, dependent) in graph.edges() {
            assert!(graph.position(dep) < graph.position(dependent));
        }
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let graph = build(vec![
            ResourceDeclaration::new("rg", "rg"),
            ResourceDeclaration::new("zone", "zone").with("rg", Value::reference("rg", "name")),
            ResourceDeclaration::new("budget", "budget"),
            ResourceDeclaration::new("vnet", "vnet").with("rg", Value::reference("rg", "name")),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["rg", "zone", "budget", "vnet"]);
    }

    #[test]
    fn test_nested_reference_creates_edge() {
        let endpoint = ResourceDeclaration::new("pe", "endpoint").with(
            "subnet",
            Value::Map([("id".to_string(), Value::reference("snet", "id"))].into()),
        );
        let graph = build(vec![endpoint, ResourceDeclaration::new("snet", "subnet")]).unwrap();
        assert_eq!(graph.dependencies("pe"), vec!["snet"]);
        assert_eq!(graph.dependents("snet"), vec!["pe"]);
    }

    #[test]
    fn test_explicit_depends_on() {
        let graph = build(vec![
            ResourceDeclaration::new("pe", "endpoint").depends_on("account"),
            ResourceDeclaration::new("account", "cognitive"),
        ])
        .unwrap();
        assert_eq!(names(&graph), vec!["account", "pe"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = build(vec![
            ResourceDeclaration::new("a", "x").with("b", Value::reference("b", "id")),
            ResourceDeclaration::new("b", "x").with("c", Value::reference("c", "id")),
            ResourceDeclaration::new("c", "x").depends_on("a"),
        ])
        .unwrap_err();

        match err {
            Error::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = build(vec![
            ResourceDeclaration::new("a", "x").with("me", Value::reference("a", "id")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn test_unknown_reference() {
        let err = build(vec![
            ResourceDeclaration::new("s", "subnet").with("vnet", Value::reference("v", "name")),
        ])
        .unwrap_err();
        match err {
            Error::UnknownReference { resource, target } => {
                assert_eq!(resource, "s");
                assert!(target.contains("'v'"));
            }
            other => panic!("expected unknown reference, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names() {
        let err = build(vec![
            ResourceDeclaration::new("a", "x"),
            ResourceDeclaration::new("a", "y"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource { name } if name == "a"));
    }

    #[test]
    fn test_config_references_are_substituted() {
        let graph = build(vec![
            ResourceDeclaration::new("rg", "rg").with("location", Value::reference("config", "location")),
        ])
        .unwrap();
        let rg = graph.get("rg").unwrap();
        assert_eq!(rg.config["location"], Value::from("eastus"));
        assert!(graph.edges().is_empty());

        let err = build(vec![
            ResourceDeclaration::new("rg", "rg").with("x", Value::reference("config", "nope")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::UnknownReference { .. }));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = build(vec![
            ResourceDeclaration::new("v", "vnet"),
            ResourceDeclaration::new("s", "subnet").with("v", Value::reference("v", "name")),
            ResourceDeclaration::new("pe", "endpoint").with("s", Value::reference("s", "id")),
            ResourceDeclaration::new("other", "rg"),
        ])
        .unwrap();
        assert_eq!(graph.transitive_dependents("v"), vec!["s", "pe"]);
        assert!(graph.transitive_dependents("other").is_empty());
    }

    #[test]
    fn test_dot_output() {
        let graph = build(vec![
            ResourceDeclaration::new("v", "vnet"),
            ResourceDeclaration::new("s", "subnet").with("v", Value::Ref(ResourceReference::new("v", "name"))),
        ])
        .unwrap();
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph resources {"));
        assert!(dot.contains("\"v\" -> \"s\";"));
    }
}
