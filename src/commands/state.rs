//! `state` commands - inspect the recorded snapshot

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ResourceRecord, StateSnapshot, StateStore};
use std::path::Path;

use crate::Context;
use crate::cli::StateCommand;
use crate::project::Project;
use crate::ui;

const ID_WIDTH: usize = 60;

pub fn run(ctx: &Context, file: &Path, cmd: &StateCommand) -> Result<()> {
    let project = Project::load(file)?;
    let store = project.state_store();
    let snapshot = store.load()?;

    match cmd {
        StateCommand::List => {
            if !ctx.quiet {
                ui::header(&format!("State for '{}'", project.deployment.name));
                ui::kv("file", &store.path().display().to_string());
                ui::kv("serial", &snapshot.serial.to_string());
                println!();
            }
            if snapshot.is_empty() {
                ui::info("No resources recorded");
                return Ok(());
            }
            for line in list_lines(&snapshot) {
                println!("{line}");
            }
            Ok(())
        }
        StateCommand::Show { name } => {
            let record = find(&snapshot, name)?;
            show(name, record)
        }
    }
}

fn find<'a>(snapshot: &'a StateSnapshot, name: &str) -> Result<&'a ResourceRecord> {
    match snapshot.get(name) {
        Some(record) => Ok(record),
        None => bail!("No resource named '{name}' in state"),
    }
}

fn list_lines(snapshot: &StateSnapshot) -> Vec<String> {
    let width = snapshot.names().map(str::len).max().unwrap_or(0);
    snapshot
        .resources
        .iter()
        .map(|(name, record)| {
            format!(
                "  {:<width$}  {}  {}",
                name,
                record.kind,
                ui::truncate_start(&record.id, ID_WIDTH).dimmed()
            )
        })
        .collect()
}

fn show(name: &str, record: &ResourceRecord) -> Result<()> {
    ui::section(name);
    ui::kv("kind", &record.kind);
    ui::kv("id", &record.id);
    ui::kv("updated", &record.updated_at.to_rfc3339());
    if !record.dependencies.is_empty() {
        ui::kv("depends on", &record.dependencies.join(", "));
    }

    if !record.outputs.is_empty() {
        ui::section("Outputs");
        for (key, value) in &record.outputs {
            ui::kv(key, &value.to_string());
        }
    }

    ui::section("Applied configuration");
    println!("{}", serde_json::to_string_pretty(&record.config)?);
    Ok(())
}
