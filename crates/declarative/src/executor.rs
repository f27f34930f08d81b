//! Execution engine - runs plan steps on a worker pool as soon as their
//! predecessors have succeeded
//!
//! The calling thread coordinates: it hands ready steps to a rayon pool,
//! collects their results over a channel, and drives the progress callback.
//! A failed step skips everything that transitively waits on it; unrelated
//! steps keep going. The working snapshot only ever records operations the
//! provider confirmed, and is saved once the pool drains.

use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::error::{Error, OperationKind, ProviderError};
use crate::planner::{Action, Plan, PlanStep, ResourceChange, StepKind};
use crate::provider::{
    Completion, DeleteRequest, OperationHandle, OperationStatus, Provider, ProvisionRequest,
};
use crate::retry::with_retry;
use crate::state::{ResourceRecord, StateSnapshot, StateStore};
use crate::types::{
    ApplyReport, ApplyResult, Attributes, ExecuteOptions, ResourceDeclaration, ResourceOutcome,
    ResourceReference, Value,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, mpsc};
use std::time::Instant;

/// Where a step ended up
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepStatus {
    Pending,
    Running,
    Done,
    Failed(String),
    Skipped(String),
}

impl StepStatus {
    fn as_result(&self, step: &PlanStep) -> ApplyResult {
        match self {
            Self::Done => match step.kind {
                StepKind::Create => ApplyResult::Created,
                StepKind::Update => ApplyResult::Updated,
                StepKind::Delete => ApplyResult::Deleted,
            },
            Self::Failed(error) => ApplyResult::Failed {
                error: error.clone(),
            },
            Self::Skipped(reason) => ApplyResult::Skipped {
                reason: reason.clone(),
            },
            Self::Pending | Self::Running => ApplyResult::Skipped {
                reason: "not reached".to_string(),
            },
        }
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - Plan computed against the snapshot currently in `store`
/// * `provider` - Cloud API to drive
/// * `store` - Where the snapshot is loaded from and saved to
/// * `opts` - Execution options (dry_run, jobs, retry, polling, cancellation)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Errors
/// Fails without touching any resource if the stored snapshot no longer
/// matches the one the plan was computed against. Individual provider
/// failures are not errors; they are reported per resource.
pub fn execute<P, C>(
    plan: &Plan,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let current = store.load()?;
    if current.serial != plan.prior_serial || current.checksum() != plan.prior_checksum {
        return Err(Error::StateConflict {
            expected_serial: plan.prior_serial,
            found_serial: current.serial,
        }
        .into());
    }

    if !plan.has_changes() {
        log::info!("No changes to apply");
        return Ok(unexecuted_report(plan, "no changes"));
    }

    if opts.dry_run {
        return Ok(unexecuted_report(plan, "dry run"));
    }

    let prompt = format!("Apply {}?", plan.summary());
    if !confirm.confirm(&prompt)? {
        log::info!("Apply declined");
        return Ok(unexecuted_report(plan, "declined"));
    }

    let prior_serial = current.serial;
    let working = Mutex::new(current);
    let statuses = run_steps(plan, provider, &working, opts, progress)?;

    let mut snapshot = working
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    snapshot.serial = prior_serial + 1;
    store
        .save(&snapshot)
        .context("Failed to save state after apply")?;

    let mut report = build_report(plan, &statuses);
    report.serial = Some(snapshot.serial);
    log::info!(
        "Apply finished: {} changed, {} failed, {} skipped",
        report.summary.total_changes(),
        report.summary.failed,
        report.summary.skipped
    );
    Ok(report)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    plan: &Plan,
    provider: &dyn Provider,
    store: &dyn StateStore,
    opts: &ExecuteOptions,
) -> Result<ApplyReport> {
    execute(plan, provider, store, opts, &mut NoProgress, &mut AutoConfirm)
}

/// Report for a plan that was not run
fn unexecuted_report(plan: &Plan, reason: &str) -> ApplyReport {
    let mut report = ApplyReport::default();
    for change in &plan.changes {
        let result = if change.action.is_change() {
            ApplyResult::Skipped {
                reason: reason.to_string(),
            }
        } else {
            ApplyResult::NoChange
        };
        report.push(ResourceOutcome {
            name: change.name.clone(),
            kind: change.kind.clone(),
            result,
        });
    }
    report
}

/// Fold step statuses back into one outcome per resource
fn build_report(plan: &Plan, statuses: &[StepStatus]) -> ApplyReport {
    let mut by_resource: HashMap<&str, Vec<(&PlanStep, &StepStatus)>> = HashMap::new();
    for (step, status) in plan.steps.iter().zip(statuses) {
        by_resource
            .entry(step.resource.as_str())
            .or_default()
            .push((step, status));
    }

    let mut report = ApplyReport::default();
    for change in &plan.changes {
        let steps = by_resource.remove(change.name.as_str()).unwrap_or_default();
        let failed = steps.iter().find_map(|(_, s)| match s {
            StepStatus::Failed(e) => Some(e.clone()),
            _ => None,
        });
        let skipped = steps.iter().find_map(|(step, s)| match s {
            StepStatus::Skipped(r) => Some((step.kind, r.clone())),
            StepStatus::Pending | StepStatus::Running => {
                Some((step.kind, "not reached".to_string()))
            }
            _ => None,
        });

        let result = match (failed, skipped) {
            (Some(error), _) => ApplyResult::Failed { error },
            (None, Some((StepKind::Create, reason))) if change.action == Action::Replace => {
                ApplyResult::Skipped {
                    reason: format!("deleted for replacement, recreate {reason}"),
                }
            }
            (None, Some((_, reason))) => ApplyResult::Skipped { reason },
            (None, None) => match change.action {
                Action::NoOp => ApplyResult::NoChange,
                Action::Create => ApplyResult::Created,
                Action::Update => ApplyResult::Updated,
                Action::Replace => ApplyResult::Replaced,
                Action::Delete => ApplyResult::Deleted,
            },
        };
        report.push(ResourceOutcome {
            name: change.name.clone(),
            kind: change.kind.clone(),
            result,
        });
    }
    report
}

/// Run every step, respecting predecessors, `opts.jobs` and cancellation
fn run_steps<P: ProgressCallback>(
    plan: &Plan,
    provider: &dyn Provider,
    working: &Mutex<StateSnapshot>,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<Vec<StepStatus>> {
    let steps = &plan.steps;
    let jobs = opts.jobs.max(1);
    let changes: HashMap<&str, &ResourceChange> = plan
        .changes
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    let mut status = vec![StepStatus::Pending; steps.len()];
    let mut remaining: Vec<usize> = steps.iter().map(|s| s.predecessors.len()).collect();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for &p in &step.predecessors {
            successors[p].push(i);
        }
    }
    let mut ready: VecDeque<usize> = (0..steps.len()).filter(|&i| remaining[i] == 0).collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("apply-{i}"))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;
    let (tx, rx) = mpsc::channel::<(usize, std::result::Result<(), Error>)>();

    progress.on_start(steps.len());
    pool.in_place_scope(|scope| {
        let mut running = 0usize;
        let mut busy: HashSet<&str> = HashSet::new();

        loop {
            let mut deferred = Vec::new();
            while running < jobs {
                let Some(i) = ready.pop_front() else { break };
                let step = &steps[i];

                if opts.cancel.is_cancelled() {
                    status[i] = StepStatus::Skipped("cancelled".to_string());
                    progress.on_step_complete(step, &status[i].as_result(step));
                    skip_dependents(i, "cancelled", steps, &successors, &mut status, progress);
                    continue;
                }
                // One operation per resource at a time
                if busy.contains(step.resource.as_str()) {
                    deferred.push(i);
                    continue;
                }

                let Some(&change) = changes.get(step.resource.as_str()) else {
                    status[i] = StepStatus::Failed(format!("{step}: not in plan"));
                    progress.on_step_complete(step, &status[i].as_result(step));
                    continue;
                };

                busy.insert(&step.resource);
                status[i] = StepStatus::Running;
                running += 1;
                progress.on_step_start(step);

                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = run_step(step, change, provider, working, opts);
                    // The receiver outlives the scope
                    let _ = tx.send((i, result));
                });
            }
            for i in deferred.into_iter().rev() {
                ready.push_front(i);
            }

            if running == 0 && ready.is_empty() {
                break;
            }
            if running == 0 {
                continue;
            }

            let Ok((i, result)) = rx.recv() else { break };
            running -= 1;
            let step = &steps[i];
            busy.remove(step.resource.as_str());

            match result {
                Ok(()) => {
                    log::info!("{step}: done");
                    status[i] = StepStatus::Done;
                    progress.on_step_complete(step, &status[i].as_result(step));
                    for &s in &successors[i] {
                        remaining[s] -= 1;
                        if remaining[s] == 0 && status[s] == StepStatus::Pending {
                            ready.push_back(s);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("{step}: {e}");
                    status[i] = StepStatus::Failed(e.to_string());
                    progress.on_step_complete(step, &status[i].as_result(step));
                    let reason = format!("blocked by failed {step}");
                    skip_dependents(i, &reason, steps, &successors, &mut status, progress);
                }
            }
        }
    });
    progress.on_finish();

    Ok(status)
}

/// Mark every pending step reachable from `start` as skipped
fn skip_dependents<P: ProgressCallback>(
    start: usize,
    reason: &str,
    steps: &[PlanStep],
    successors: &[Vec<usize>],
    status: &mut [StepStatus],
    progress: &mut P,
) {
    let mut stack = successors[start].clone();
    while let Some(s) = stack.pop() {
        if status[s] != StepStatus::Pending {
            continue;
        }
        log::debug!("{}: skipped ({reason})", steps[s]);
        status[s] = StepStatus::Skipped(reason.to_string());
        progress.on_step_complete(&steps[s], &status[s].as_result(&steps[s]));
        stack.extend(&successors[s]);
    }
}

fn lock(working: &Mutex<StateSnapshot>) -> MutexGuard<'_, StateSnapshot> {
    working
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Perform one step on a worker thread
fn run_step(
    step: &PlanStep,
    change: &ResourceChange,
    provider: &dyn Provider,
    working: &Mutex<StateSnapshot>,
    opts: &ExecuteOptions,
) -> std::result::Result<(), Error> {
    match step.kind {
        StepKind::Delete => delete_resource(step, provider, working, opts),
        StepKind::Create | StepKind::Update => {
            provision_resource(step, change, provider, working, opts)
        }
    }
}

/// Replace every reference in `decl` with the value recorded in `snapshot`
fn resolve_config(
    decl: &ResourceDeclaration,
    snapshot: &StateSnapshot,
    operation: OperationKind,
) -> std::result::Result<Attributes, Error> {
    let mut resolve = |r: &ResourceReference| {
        snapshot
            .get(&r.resource)
            .and_then(|rec| rec.attribute(&r.attribute))
            .map(Some)
            .ok_or_else(|| Error::UnresolvedReference {
                resource: decl.name.clone(),
                operation,
                reference: r.to_string(),
            })
    };

    let mut config = Attributes::new();
    for (key, value) in &decl.config {
        let resolved = value.try_map_refs(&mut resolve)?.unwrap_or(Value::Null);
        config.insert(key.clone(), resolved);
    }
    Ok(config)
}

fn provision_resource(
    step: &PlanStep,
    change: &ResourceChange,
    provider: &dyn Provider,
    working: &Mutex<StateSnapshot>,
    opts: &ExecuteOptions,
) -> std::result::Result<(), Error> {
    let operation = step.kind.operation();
    let provider_error = |source: ProviderError| Error::Provider {
        resource: step.resource.clone(),
        operation,
        source,
    };
    let decl = change
        .declaration
        .as_ref()
        .ok_or_else(|| provider_error(ProviderError::fatal("resource is not declared")))?;

    let request = {
        let snapshot = lock(working);
        ProvisionRequest {
            name: decl.name.clone(),
            kind: decl.kind.clone(),
            config: resolve_config(decl, &snapshot, operation)?,
            id: match step.kind {
                StepKind::Update => snapshot.get(&decl.name).map(|r| r.id.clone()),
                _ => None,
            },
        }
    };

    let label = step.to_string();
    log::info!("{label}: calling provider");
    let status = with_retry(&opts.retry, &opts.cancel, &label, || match step.kind {
        StepKind::Update => provider.update(&request),
        _ => provider.create(&request),
    })
    .map_err(provider_error)?;

    match wait_for_completion(provider, status, step, opts)? {
        Completion::Provisioned { id, outputs } => {
            log::debug!("{label}: provisioned as {id}");
            let record = ResourceRecord {
                kind: request.kind,
                id,
                config: request.config,
                outputs,
                dependencies: change.dependencies.clone(),
                updated_at: Utc::now(),
            };
            lock(working).insert(&step.resource, record);
            Ok(())
        }
        Completion::Deleted => Err(provider_error(ProviderError::fatal(
            "provider reported a deletion",
        ))),
    }
}

fn delete_resource(
    step: &PlanStep,
    provider: &dyn Provider,
    working: &Mutex<StateSnapshot>,
    opts: &ExecuteOptions,
) -> std::result::Result<(), Error> {
    let provider_error = |source: ProviderError| Error::Provider {
        resource: step.resource.clone(),
        operation: OperationKind::Delete,
        source,
    };
    let request = {
        let snapshot = lock(working);
        let Some(record) = snapshot.get(&step.resource) else {
            log::debug!("{step}: no record, nothing to delete");
            return Ok(());
        };
        DeleteRequest {
            name: step.resource.clone(),
            kind: record.kind.clone(),
            id: record.id.clone(),
        }
    };

    let label = step.to_string();
    log::info!("{label}: calling provider");
    let status = with_retry(&opts.retry, &opts.cancel, &label, || provider.delete(&request))
        .map_err(provider_error)?;

    match wait_for_completion(provider, status, step, opts)? {
        Completion::Deleted => {
            lock(working).remove(&step.resource);
            Ok(())
        }
        Completion::Provisioned { .. } => Err(provider_error(ProviderError::fatal(
            "provider did not report a deletion",
        ))),
    }
}

/// Poll a long-running operation until it finishes, times out, or is cancelled
///
/// On cancellation the provider is asked to abandon the operation and polled
/// once more; an operation that finished anyway still counts.
fn wait_for_completion(
    provider: &dyn Provider,
    status: OperationStatus,
    step: &PlanStep,
    opts: &ExecuteOptions,
) -> std::result::Result<Completion, Error> {
    let operation = step.kind.operation();
    let mut handle: OperationHandle = match status {
        OperationStatus::Completed(completion) => return Ok(completion),
        OperationStatus::InProgress(handle) => handle,
    };
    let label = step.to_string();
    let started = Instant::now();

    loop {
        if opts.cancel.is_cancelled() {
            log::warn!("{label}: cancelling in-flight operation");
            provider.cancel(&handle);
            return match provider.poll(&handle) {
                Ok(OperationStatus::Completed(completion)) => Ok(completion),
                _ => Err(Error::Cancelled {
                    resource: step.resource.clone(),
                    operation,
                }),
            };
        }
        if started.elapsed() >= opts.operation_timeout {
            return Err(Error::Provider {
                resource: step.resource.clone(),
                operation,
                source: ProviderError::fatal(format!(
                    "operation did not finish within {}s",
                    opts.operation_timeout.as_secs()
                )),
            });
        }
        if !opts.cancel.sleep(opts.poll_interval) {
            continue;
        }

        log::debug!("{label}: polling");
        let status = with_retry(&opts.retry, &opts.cancel, &label, || provider.poll(&handle))
            .map_err(|source| Error::Provider {
                resource: step.resource.clone(),
                operation,
                source,
            })?;
        match status {
            OperationStatus::Completed(completion) => return Ok(completion),
            OperationStatus::InProgress(next) => handle = next,
        }
    }
}
