//! `validate` and `graph` commands

use anyhow::Result;
use colored::Colorize;
use declarative::{DependencyGraph, Provider, StateSnapshot};
use std::path::Path;

use super::provider_for;
use crate::Context;
use crate::project::Project;
use crate::ui;

/// Build the graph and check every kind and reference against the provider
pub fn validate(ctx: &Context, file: &Path) -> Result<()> {
    let project = Project::load(file)?;
    let provider = provider_for(&project);
    let graph = check(&project, &provider)?;

    if !ctx.quiet {
        ui::success(&format!(
            "{} is valid: {} resources, {} dependencies",
            file.display(),
            graph.len(),
            graph.edges().len()
        ));
    }
    Ok(())
}

fn check(project: &Project, provider: &dyn Provider) -> Result<DependencyGraph> {
    let graph = project.graph()?;
    // Planning against an empty snapshot runs the kind and attribute checks
    declarative::plan(&graph, &StateSnapshot::new(), provider)?;
    Ok(graph)
}

/// Print the topological order with each resource's dependencies
pub fn graph(_ctx: &Context, file: &Path, dot: bool) -> Result<()> {
    let project = Project::load(file)?;
    let graph = project.graph()?;

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    ui::header(&format!("Dependency order for '{}'", project.deployment.name));
    for line in listing(&graph) {
        println!("{line}");
    }
    Ok(())
}

fn listing(graph: &DependencyGraph) -> Vec<String> {
    graph
        .ordered()
        .enumerate()
        .map(|(i, decl)| {
            let deps = graph.dependencies(&decl.name);
            let mut line = format!("{:>3}. {} {}", i + 1, decl.name.bold(), decl.kind.dimmed());
            if !deps.is_empty() {
                line.push_str(&format!(" ← {}", deps.join(", ")));
            }
            line
        })
        .collect()
}
