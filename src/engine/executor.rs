//! Execution engine - cirrus-specific callbacks with UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyReport, ApplyResult, ConfirmCallback, ExecuteOptions, Plan, PlanStep, ProgressCallback,
    Provider, StateStore,
};
use indicatif::ProgressBar;

use crate::progress;

/// Symbol shown next to a finished resource
pub fn result_symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created
        | ApplyResult::Updated
        | ApplyResult::Replaced
        | ApplyResult::Deleted => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Drives an indicatif bar from executor callbacks
pub struct BarProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for BarProgress {
    fn on_start(&mut self, total_steps: usize) {
        let bar = if self.quiet {
            progress::hidden()
        } else {
            progress::step_bar(total_steps as u64, "Applying")
        };
        self.bar = Some(bar);
    }

    fn on_step_start(&mut self, step: &PlanStep) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("→ {step}"));
        }
    }

    fn on_step_complete(&mut self, step: &PlanStep, result: &ApplyResult) {
        let Some(bar) = &self.bar else { return };
        bar.set_message(format!("{} {step}", result_symbol(result)));
        bar.inc(1);
        if let ApplyResult::Failed { error } = result {
            bar.suspend(|| {
                eprintln!("  {} {step}: {error}", "✗".red());
            });
        }
    }

    fn on_finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Asks on the terminal unless `--yes` was given
pub struct PromptConfirm {
    pub yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        println!();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

/// Execute a plan with progress and confirmation wired to the terminal
pub fn run(
    plan: &Plan,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
    yes: bool,
    quiet: bool,
) -> Result<ApplyReport> {
    let mut progress = BarProgress::new(quiet);
    let mut confirm = PromptConfirm { yes };
    declarative::execute(plan, provider, store, opts, &mut progress, &mut confirm)
}

fn describe_result(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "unchanged".to_string(),
        ApplyResult::Created => "created".to_string(),
        ApplyResult::Updated => "updated".to_string(),
        ApplyResult::Replaced => "replaced".to_string(),
        ApplyResult::Deleted => "deleted".to_string(),
        ApplyResult::Failed { error } => format!("failed: {error}"),
        ApplyResult::Skipped { reason } => format!("skipped: {reason}"),
    }
}

/// Print final report
pub fn print_report(report: &ApplyReport, verbose: bool) {
    let summary = &report.summary;

    if verbose {
        println!();
        for outcome in &report.outcomes {
            let line = format!(
                "{} {} {}",
                result_symbol(&outcome.result),
                outcome.name,
                describe_result(&outcome.result)
            );
            match outcome.result {
                ApplyResult::Failed { .. } => println!("    {}", line.red()),
                ApplyResult::Skipped { .. } => println!("    {}", line.yellow()),
                _ => println!("    {line}"),
            }
        }
    } else {
        for outcome in report.failed().chain(report.skipped()) {
            println!(
                "    {} {} {}",
                result_symbol(&outcome.result),
                outcome.name,
                describe_result(&outcome.result).dimmed()
            );
        }
    }

    println!();
    if summary.is_success() {
        println!("  {} Deployment applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Deployment applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    if let Some(serial) = report.serial {
        println!("    • state saved at serial {serial}");
    }
}
