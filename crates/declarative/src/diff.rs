//! Field-level diffs between applied and desired configuration

use crate::types::{Attributes, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A desired value as far as it can be known at plan time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedValue {
    Known(Value),
    /// Depends on an attribute that only exists after apply
    Unknown,
}

impl PlannedValue {
    pub fn known(&self) -> Option<&Value> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

impl From<Option<Value>> for PlannedValue {
    fn from(v: Option<Value>) -> Self {
        v.map_or(Self::Unknown, Self::Known)
    }
}

impl fmt::Display for PlannedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => write!(f, "(known after apply)"),
        }
    }
}

/// Desired configuration with references resolved as far as possible
pub type PlannedConfig = BTreeMap<String, PlannedValue>;

/// One top-level configuration field that differs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    /// Last-applied value; `None` if the field is new
    pub before: Option<Value>,
    /// Desired value; `None` if the field was removed
    pub after: Option<PlannedValue>,
    /// Whether the provider can't change this field in place
    pub forces_replacement: bool,
}

/// Compare last-applied configuration with the planned one
///
/// Unknown values always count as a change, since the applied value cannot be
/// proven equal. `is_immutable` comes from the provider's kind schema.
pub fn diff_fields(
    applied: &Attributes,
    desired: &PlannedConfig,
    is_immutable: impl Fn(&str) -> bool,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for (field, after) in desired {
        let before = applied.get(field);
        let changed = match (before, after) {
            (Some(b), PlannedValue::Known(a)) => b != a,
            _ => true,
        };
        if changed {
            changes.push(FieldChange {
                field: field.clone(),
                before: before.cloned(),
                after: Some(after.clone()),
                forces_replacement: is_immutable(field),
            });
        }
    }

    for (field, before) in applied {
        if !desired.contains_key(field) {
            changes.push(FieldChange {
                field: field.clone(),
                before: Some(before.clone()),
                after: None,
                forces_replacement: is_immutable(field),
            });
        }
    }

    changes.sort_by(|a, b| a.field.cmp(&b.field));
    changes
}
