//! # Declarative
//!
//! Dependency-ordered provisioning of cloud resources.
//!
//! Resources are declared with their desired configuration. Values may
//! reference attributes of other resources, which only become known once
//! those resources exist. The crate turns declarations into a dependency
//! graph, diffs them against the last recorded state, and applies the
//! resulting plan through a [`Provider`] with as much parallelism as the
//! graph allows.
//!
//! ## Core Concepts
//!
//! - **ResourceDeclaration**: What should exist, with a provider-defined kind
//! - **DependencyGraph**: Validated DAG built from references and `depends_on`
//! - **Plan**: Create/update/replace/delete per resource, flattened to steps
//! - **StateSnapshot**: What was actually provisioned, with outputs and ids
//! - **Executor**: Runs steps on a worker pool, isolating failures
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     DeploymentConfig, ExecuteOptions, GraphBuilder, MemoryStateStore,
//!     ResourceDeclaration, StateStore, Value, execute_simple, plan,
//! };
//!
//! let config = DeploymentConfig::new("demo", "eastus");
//! let graph = GraphBuilder::new(&config).build(vec![
//!     ResourceDeclaration::new("rg", "azure:resources:ResourceGroup")
//!         .with("location", Value::reference("config", "location")),
//!     ResourceDeclaration::new("vnet", "azure:network:VirtualNetwork")
//!         .with("resourceGroupName", Value::reference("rg", "name")),
//! ])?;
//!
//! let store = MemoryStateStore::new();
//! let plan = plan(&graph, &store.load()?, &provider)?;
//! println!("{plan}");
//!
//! let report = execute_simple(&plan, &provider, &store, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Extension Traits
//!
//! - [`Provider`]: The cloud API, with per-kind schemas
//! - [`StateStore`]: Where snapshots live between runs
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks, clouds, or storage backends.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod retry;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, CancellationToken, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{FieldChange, PlannedConfig, PlannedValue, diff_fields};
pub use error::{Error, ErrorCategory, OperationKind, ProviderError};
pub use executor::{execute, execute_simple};
pub use graph::{DependencyGraph, GraphBuilder};
pub use planner::{
    Action, Plan, PlanStep, PlanSummary, ResourceChange, StepKind, plan, plan_destroy,
};
pub use provider::{
    Completion, DeleteRequest, KindSchema, OperationHandle, OperationStatus, Provider,
    ProvisionRequest,
};
pub use retry::{RetryPolicy, with_retry};
pub use state::{FileStateStore, MemoryStateStore, ResourceRecord, StateSnapshot, StateStore};
pub use types::{
    ApplyReport, ApplyResult, Attributes, CONFIG_RESOURCE, DeploymentConfig, ExecuteOptions,
    ExecuteSummary, ResourceDeclaration, ResourceOutcome, ResourceReference, Value,
};
