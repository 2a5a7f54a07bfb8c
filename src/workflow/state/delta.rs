// SPDX-License-Identifier: MIT

//! State deltas returned by nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::MergePolicy;

/// A single write into the workflow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FieldWrite {
    Replace { field: String, value: Value },
    Append { field: String, values: Vec<Value> },
}

impl FieldWrite {
    pub fn field(&self) -> &str {
        match self {
            FieldWrite::Replace { field, .. } | FieldWrite::Append { field, .. } => field,
        }
    }

    pub fn policy(&self) -> MergePolicy {
        match self {
            FieldWrite::Replace { .. } => MergePolicy::Replace,
            FieldWrite::Append { .. } => MergePolicy::Append,
        }
    }
}

/// Ordered list of writes, applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    writes: Vec<FieldWrite>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a field's value
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.writes.push(FieldWrite::Replace {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    /// Append one value to a field
    pub fn append(self, field: &str, value: impl Into<Value>) -> Self {
        self.extend(field, vec![value.into()])
    }

    /// Append several values to a field, keeping their order
    pub fn extend(mut self, field: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return self;
        }
        self.writes.push(FieldWrite::Append {
            field: field.to_string(),
            values,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[FieldWrite] {
        &self.writes
    }

    /// Last value replaced into `field` by this delta
    pub fn replaced(&self, field: &str) -> Option<&Value> {
        self.writes.iter().rev().find_map(|w| match w {
            FieldWrite::Replace { field: f, value } if f == field => Some(value),
            _ => None,
        })
    }

    /// Whether this delta touches `field` at all
    pub fn touches(&self, field: &str) -> bool {
        self.writes.iter().any(|w| w.field() == field)
    }
}
