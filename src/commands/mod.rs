//! Command implementations

use crate::azure::{DEFAULT_SUBSCRIPTION, SimulatedAzure};
use crate::project::Project;

pub mod deploy;
pub mod graph;
pub mod init;
pub mod state;

/// Polls the simulator needs before a long-running operation completes
const SIMULATED_LATENCY_POLLS: u32 = 1;

/// Provider for a project's subscription
fn provider_for(project: &Project) -> SimulatedAzure {
    let subscription = project
        .deployment
        .subscription_id
        .as_deref()
        .unwrap_or(DEFAULT_SUBSCRIPTION);
    SimulatedAzure::new(subscription).with_latency(SIMULATED_LATENCY_POLLS)
}
