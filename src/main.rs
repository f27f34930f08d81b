mod azure;
mod cli;
mod commands;
mod engine;
mod paths;
mod progress;
mod project;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let file = paths::expand(&cli.file.to_string_lossy());

    match cli.command {
        Command::Init { force } => commands::init::run(&ctx, &file, force),
        Command::Validate => commands::graph::validate(&ctx, &file),
        Command::Graph { dot } => commands::graph::graph(&ctx, &file, dot),
        Command::Plan(args) => commands::deploy::plan(&ctx, &file, &args),
        Command::Apply(args) => commands::deploy::apply(&ctx, &file, &args),
        Command::Destroy(args) => commands::deploy::destroy(&ctx, &file, &args),
        Command::State(cmd) => commands::state::run(&ctx, &file, &cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cirrus", &mut io::stdout());
            Ok(())
        }
    }
}
