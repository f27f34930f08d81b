use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::paths::PROJECT_FILE;

#[derive(Parser)]
#[command(name = "cirrus")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and apply dependency-ordered cloud deployments", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project file
    #[arg(short, long, global = true, env = "CIRRUS_PROJECT", default_value = PROJECT_FILE)]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample project file
    Init {
        /// Overwrite an existing project file
        #[arg(long)]
        force: bool,
    },

    /// Check that the declarations form a valid graph
    Validate,

    /// Show the dependency graph
    Graph {
        /// Emit Graphviz DOT instead of a listing
        #[arg(long)]
        dot: bool,
    },

    /// Preview what apply would change
    Plan(PlanArgs),

    /// Make deployed resources match the project file
    Apply(ApplyArgs),

    /// Delete every resource recorded in state
    Destroy(DestroyArgs),

    /// Inspect the state snapshot
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Plan / Apply / Destroy
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Also list resources with no changes
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without executing it
    #[arg(long)]
    pub dry_run: bool,

    /// Number of parallel provider operations
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel provider operations
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List,

    /// Show one recorded resource
    Show {
        /// Logical resource name
        name: String,
    },
}
