//! Deployment commands
//!
//! - `plan` - Preview what apply would change
//! - `apply` - Make deployed resources match the project file
//! - `destroy` - Delete everything recorded in state

use anyhow::{Result, bail};
use declarative::{ApplyReport, CancellationToken, ExecuteOptions, Plan, Provider, StateStore};
use std::path::Path;

use super::provider_for;
use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs, PlanArgs};
use crate::engine;
use crate::project::Project;
use crate::ui;

// ============================================================================
// Plan
// ============================================================================

pub fn plan(ctx: &Context, file: &Path, args: &PlanArgs) -> Result<()> {
    let project = Project::load(file)?;
    let provider = provider_for(&project);
    let store = project.state_store();

    let plan = compute_plan(&project, &provider, &store)?;

    if args.json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Plan for '{}'", project.deployment.name));
        ui::kv("subscription", provider.subscription_id());
        ui::kv("state", &store.path().display().to_string());
        ui::kv("serial", &plan.prior_serial.to_string());
    }
    engine::display_plan(&plan, args.all);
    Ok(())
}

fn compute_plan(project: &Project, provider: &dyn Provider, store: &dyn StateStore) -> Result<Plan> {
    let graph = project.graph()?;
    let prior = store.load()?;
    let plan = declarative::plan(&graph, &prior, provider)?;
    log::debug!("Planned {} steps against serial {}", plan.steps.len(), prior.serial);
    Ok(plan)
}

// ============================================================================
// Apply
// ============================================================================

pub fn apply(ctx: &Context, file: &Path, args: &ApplyArgs) -> Result<()> {
    let project = Project::load(file)?;
    let provider = provider_for(&project);
    let store = project.state_store();

    let mut opts = project.execute_options(args.jobs);
    opts.dry_run = args.dry_run;
    cancel_on_interrupt(&opts.cancel);

    let plan = compute_plan(&project, &provider, &store)?;
    let report = run_plan(ctx, &plan, &provider, &store, &opts, args.yes)?;
    finish(ctx, &plan, &report, opts.dry_run)
}

// ============================================================================
// Destroy
// ============================================================================

pub fn destroy(ctx: &Context, file: &Path, args: &DestroyArgs) -> Result<()> {
    let project = Project::load(file)?;
    let provider = provider_for(&project);
    let store = project.state_store();
    let opts = project.execute_options(args.jobs);
    cancel_on_interrupt(&opts.cancel);

    let plan = destroy_plan(&provider, &store)?;
    let report = run_plan(ctx, &plan, &provider, &store, &opts, args.yes)?;
    finish(ctx, &plan, &report, false)
}

fn destroy_plan(provider: &dyn Provider, store: &dyn StateStore) -> Result<Plan> {
    let prior = store.load()?;
    Ok(declarative::plan_destroy(&prior, provider)?)
}

// ============================================================================
// Shared
// ============================================================================

/// Stop scheduling new steps on the first Ctrl-C, exit on the second
fn cancel_on_interrupt(cancel: &CancellationToken) {
    if let Err(e) = ctrlc::set_handler(interrupt_handler(cancel.clone())) {
        log::warn!("Failed to install Ctrl+C handler: {e}");
    }
}

fn interrupt_handler(cancel: CancellationToken) -> impl FnMut() + Send + 'static {
    move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("Interrupted - waiting for running operations, then saving state");
        cancel.cancel();
    }
}

/// Show the plan, then confirm and execute it
fn run_plan(
    ctx: &Context,
    plan: &Plan,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
    yes: bool,
) -> Result<ApplyReport> {
    if !ctx.quiet {
        engine::display_plan(plan, ctx.verbose > 0);
    }
    engine::executor::run(plan, provider, store, opts, yes, ctx.quiet)
}

fn finish(ctx: &Context, plan: &Plan, report: &ApplyReport, dry_run: bool) -> Result<()> {
    if !plan.has_changes() {
        return Ok(());
    }

    if report.serial.is_none() {
        println!();
        if dry_run {
            ui::info("Dry run - no changes made");
        } else {
            ui::warn("Aborted - no changes made");
        }
        return Ok(());
    }

    let incomplete = !report.is_success() || report.summary.skipped > 0;
    if !ctx.quiet || incomplete {
        engine::print_report(report, ctx.verbose > 0);
    }

    if incomplete {
        bail!(
            "{} resource(s) failed, {} skipped",
            report.summary.failed,
            report.summary.skipped
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::SimulatedAzure;
    use crate::commands::init::SAMPLE_PROJECT;
    use declarative::{Action, ApplyResult, FileStateStore};
    use std::time::Duration;

    const SUB: &str = "11111111-2222-3333-4444-555555555555";

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    fn fast_options() -> ExecuteOptions {
        ExecuteOptions {
            poll_interval: Duration::from_millis(1),
            ..ExecuteOptions::default()
        }
    }

    fn sample(content: &str) -> Project {
        Project::parse(content, Path::new("cirrus.toml")).unwrap()
    }

    fn apply_sample(
        project: &Project,
        provider: &SimulatedAzure,
        store: &FileStateStore,
    ) -> ApplyReport {
        let plan = compute_plan(project, provider, store).unwrap();
        run_plan(&quiet(), &plan, provider, store, &fast_options(), true).unwrap()
    }

    #[test]
    fn test_sample_applies_and_converges() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("demo.json"));
        let provider = SimulatedAzure::new(SUB).with_latency(1);
        let project = sample(SAMPLE_PROJECT);

        let report = apply_sample(&project, &provider, &store);
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.summary.created, 14);
        assert_eq!(report.serial, Some(1));

        let snapshot = store.load().unwrap();
        let webapp = snapshot.get("webApp").unwrap();
        let Some(declarative::Value::Map(site)) = webapp.config.get("siteConfig") else {
            panic!("siteConfig missing");
        };
        let settings = site["appSettings"].to_string();
        assert!(settings.contains(".cognitiveservices.azure.com/"));

        let again = compute_plan(&project, &provider, &store).unwrap();
        assert!(!again.has_changes(), "{again}");
    }

    #[test]
    fn test_mutable_change_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("demo.json"));
        let provider = SimulatedAzure::new(SUB);
        apply_sample(&sample(SAMPLE_PROJECT), &provider, &store);

        let edited = SAMPLE_PROJECT.replace("10.0.1.0/24", "10.0.2.0/24");
        let plan = compute_plan(&sample(&edited), &provider, &store).unwrap();
        assert_eq!(plan.action("endpointSubnet"), Some(Action::Update));
        assert_eq!(plan.action("privateEndpoint"), Some(Action::NoOp));
        assert_eq!(plan.summary().total_changes(), 1);
    }

    #[test]
    fn test_immutable_change_replaces_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("demo.json"));
        let provider = SimulatedAzure::new(SUB);
        apply_sample(&sample(SAMPLE_PROJECT), &provider, &store);

        let edited = SAMPLE_PROJECT.replace(
            "customSubDomainName = \"cirrus-demo-language\"\n",
            "customSubDomainName = \"cirrus-demo-language\"\naccountName = \"language-v2\"\n",
        );
        let project = sample(&edited);
        let plan = compute_plan(&project, &provider, &store).unwrap();
        assert_eq!(plan.action("languageAccount"), Some(Action::Replace));
        assert_eq!(plan.action("privateEndpoint"), Some(Action::Replace));
        assert_eq!(plan.action("resourceGroup"), Some(Action::NoOp));

        let report = run_plan(&quiet(), &plan, &provider, &store, &fast_options(), true).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            report.outcome("languageAccount"),
            Some(&ApplyResult::Replaced)
        );

        let converged = compute_plan(&project, &provider, &store).unwrap();
        assert!(!converged.has_changes(), "{converged}");
    }

    #[test]
    fn test_destroy_empties_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("demo.json"));
        let provider = SimulatedAzure::new(SUB).with_latency(1);
        apply_sample(&sample(SAMPLE_PROJECT), &provider, &store);

        let plan = destroy_plan(&provider, &store).unwrap();
        assert_eq!(plan.summary().delete, 14);

        let report = run_plan(&quiet(), &plan, &provider, &store, &fast_options(), true).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.summary.deleted, 14);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(provider.pending(), 0);
    }

    #[test]
    fn test_interrupt_cancels_token() {
        let cancel = CancellationToken::new();
        let mut handler = interrupt_handler(cancel.clone());
        assert!(!cancel.is_cancelled());
        handler();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_apply_skips_and_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("demo.json"));
        let provider = SimulatedAzure::new(SUB);
        let project = sample(SAMPLE_PROJECT);

        let opts = fast_options();
        let mut interrupt = interrupt_handler(opts.cancel.clone());
        interrupt();

        let plan = compute_plan(&project, &provider, &store).unwrap();
        let report = run_plan(&quiet(), &plan, &provider, &store, &opts, true).unwrap();
        assert_eq!(report.skipped().count(), 14);
        assert!(matches!(
            report.outcome("resourceGroup"),
            Some(ApplyResult::Skipped { .. })
        ));
        assert_eq!(report.serial, Some(1));
        assert_eq!(provider.pending(), 0);

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.serial, 1);
        assert!(snapshot.is_empty());
        let err = finish(&quiet(), &plan, &report, false).unwrap_err();
        assert!(err.to_string().contains("14 skipped"));

        // The next run starts from the saved snapshot
        let resumed = compute_plan(&project, &provider, &store).unwrap();
        assert_eq!(resumed.prior_serial, 1);
        assert_eq!(resumed.summary().create, 14);
    }

    #[test]
    fn test_finish_reports_failures() {
        let plan = Plan {
            changes: Vec::new(),
            steps: vec![declarative::PlanStep {
                resource: "rg".to_string(),
                kind: declarative::StepKind::Create,
                replacing: false,
                predecessors: Vec::new(),
            }],
            prior_serial: 0,
            prior_checksum: String::new(),
        };
        let mut report = ApplyReport {
            serial: Some(1),
            ..ApplyReport::default()
        };
        report.summary.failed = 1;
        let err = finish(&quiet(), &plan, &report, false).unwrap_err();
        assert!(err.to_string().contains("1 resource(s) failed"));

        let dry = ApplyReport::default();
        assert!(finish(&quiet(), &plan, &dry, true).is_ok());
    }
}
