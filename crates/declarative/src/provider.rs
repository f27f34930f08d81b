//! Provider trait: the cloud API the executor drives
//!
//! A provider owns three things per resource kind: the create/update/delete
//! calls, the table of which configuration fields can change in place, and
//! the set of output attributes a provisioned resource exposes.

use crate::error::ProviderError;
use crate::types::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static description of a resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSchema {
    pub kind: String,
    /// Fields that force a replacement when changed
    pub immutable: BTreeSet<String>,
    /// Attributes available after provisioning, besides `id`
    pub outputs: BTreeSet<String>,
}

impl KindSchema {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn with_immutable(mut self, fields: &[&str]) -> Self {
        self.immutable.extend(fields.iter().map(|f| (*f).to_string()));
        self
    }

    pub fn with_outputs(mut self, attrs: &[&str]) -> Self {
        self.outputs.extend(attrs.iter().map(|a| (*a).to_string()));
        self
    }

    /// Whether changing `field` requires destroy-then-recreate
    pub fn is_immutable(&self, field: &str) -> bool {
        self.immutable.contains(field)
    }

    /// Whether `attribute` is produced by the provider
    pub fn has_output(&self, attribute: &str) -> bool {
        attribute == "id" || self.outputs.contains(attribute)
    }
}

/// Create or update request with every reference resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub name: String,
    pub kind: String,
    pub config: Attributes,
    /// Provider id of the existing resource, for updates
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub name: String,
    pub kind: String,
    pub id: String,
}

/// Token identifying a long-running provider operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    pub resource: String,
    pub token: String,
}

/// Terminal result of a provider operation
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Provisioned { id: String, outputs: Attributes },
    Deleted,
}

/// State of a provider operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    InProgress(OperationHandle),
    Completed(Completion),
}

/// A resource provider
///
/// Implementations must be safe to call from several worker threads; the
/// executor never has two calls for the same resource in flight.
pub trait Provider: Send + Sync {
    /// Schema for a resource kind, or `None` if the kind is unsupported
    fn schema(&self, kind: &str) -> Option<&KindSchema>;

    fn create(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError>;

    fn update(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError>;

    fn delete(&self, request: &DeleteRequest) -> Result<OperationStatus, ProviderError>;

    /// Check on a long-running operation
    fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, ProviderError>;

    /// Best-effort request to abandon a long-running operation
    fn cancel(&self, _handle: &OperationHandle) {}
}
