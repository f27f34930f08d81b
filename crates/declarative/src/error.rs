//! Error types for planning and execution.
//!
//! Errors are categorized so the executor can decide what to retry and
//! the CLI can give appropriate feedback. Declaration-time errors abort
//! before any provider call; provider errors are scoped to a single node.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The operation a node-level error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Plan,
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plan => "plan",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Categories of errors for retry logic and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid declaration set (cycle, unknown reference, ...)
    Declaration,
    /// Provider throttling or other temporary failure
    Transient,
    /// Provider rejected the operation
    Fatal,
    /// Persisted state does not match the plan
    StateConflict,
    /// Stopped by a cancellation signal
    Cancelled,
    /// State storage could not be read or written
    Storage,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Declaration => "Invalid resource declarations",
            Self::Transient => "Temporary provider failure",
            Self::Fatal => "Provider rejected the operation",
            Self::StateConflict => "State changed since the plan was made",
            Self::Cancelled => "Operation cancelled",
            Self::Storage => "State storage failure",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Declaration => "Fix the declarations and run plan again",
            Self::Transient => "Wait a moment and apply again",
            Self::Fatal => "Check the resource configuration against the provider's requirements",
            Self::StateConflict => "Run plan again against the current state",
            Self::Cancelled => "Apply again to finish the remaining operations",
            Self::Storage => "Check that the state file is readable and writable",
        }
    }
}

/// Errors returned by a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderError {
    /// Throttling, timeouts, conflicting in-flight operations
    #[error("transient provider error: {message}")]
    Transient { message: String },

    /// Invalid configuration, quota exceeded, permission denied
    #[error("provider error: {message}")]
    Fatal { message: String },
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Fatal { .. } => ErrorCategory::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Errors that can occur while building, planning, or applying.
#[derive(Debug, Error)]
pub enum Error {
    /// The declarations contain a dependency cycle
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle {
        /// Resource names along the cycle, first name repeated at the end
        path: Vec<String>,
    },

    /// A reference names a resource, attribute, or config key that doesn't exist
    #[error("resource '{resource}' references unknown {target}")]
    UnknownReference {
        /// Resource holding the reference
        resource: String,
        /// What could not be found, e.g. "resource 'vnet'"
        target: String,
    },

    /// Two declarations share a logical name
    #[error("resource '{name}' is declared more than once")]
    DuplicateResource { name: String },

    /// The provider has no schema for a declared kind
    #[error("resource '{resource}' has unsupported kind '{kind}'")]
    UnknownKind { resource: String, kind: String },

    /// Persisted snapshot is not the one the plan was computed against
    #[error(
        "state conflict: plan was made against serial {expected_serial} but state is at serial {found_serial}"
    )]
    StateConflict {
        expected_serial: u64,
        found_serial: u64,
    },

    /// A provider call failed after any retries
    #[error("{operation} '{resource}' failed: {source}")]
    Provider {
        resource: String,
        operation: OperationKind,
        #[source]
        source: ProviderError,
    },

    /// A referenced output attribute was never produced
    #[error("{operation} '{resource}': reference {reference} did not resolve")]
    UnresolvedReference {
        resource: String,
        operation: OperationKind,
        reference: String,
    },

    /// Execution stopped by cancellation
    #[error("{operation} '{resource}' cancelled")]
    Cancelled {
        resource: String,
        operation: OperationKind,
    },

    /// State storage I/O failed
    #[error("state storage error: {message}")]
    Storage { message: String },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cycle { .. }
            | Self::UnknownReference { .. }
            | Self::DuplicateResource { .. }
            | Self::UnknownKind { .. } => ErrorCategory::Declaration,
            Self::StateConflict { .. } => ErrorCategory::StateConflict,
            Self::Provider { source, .. } => source.category(),
            Self::UnresolvedReference { .. } => ErrorCategory::Fatal,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Logical name of the offending resource, when there is one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::UnknownReference { resource, .. }
            | Self::UnknownKind { resource, .. }
            | Self::Provider { resource, .. }
            | Self::UnresolvedReference { resource, .. }
            | Self::Cancelled { resource, .. } => Some(resource),
            Self::DuplicateResource { name } => Some(name),
            Self::Cycle { path } => path.first().map(String::as_str),
            Self::StateConflict { .. } | Self::Storage { .. } => None,
        }
    }

    /// Operation the error happened in
    pub fn operation(&self) -> OperationKind {
        match self {
            Self::Provider { operation, .. }
            | Self::UnresolvedReference { operation, .. }
            | Self::Cancelled { operation, .. } => *operation,
            _ => OperationKind::Plan,
        }
    }

    pub(crate) fn storage(message: impl fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
