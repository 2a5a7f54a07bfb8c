// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::delta::{FieldWrite, StateDelta};
use super::schema::{MergePolicy, StateSchema};
use crate::error::StateError;

/// Prefix of fields owned by the engine
pub const RESERVED_PREFIX: &str = "__";
/// Holds the external response while the resumed node runs
pub const RESUME_FIELD: &str = "__resume";
/// Last node failure recovered through a fallback transition
pub const ERROR_FIELD: &str = "__error";

/// Runtime workflow state.
///
/// Keys are kept ordered so that serialized checkpoints are byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    fields: BTreeMap<String, Value>,
}

impl WorkflowState {
    /// Create a new WorkflowState from a schema's defaults
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = BTreeMap::new();

        for (name, def) in &schema.fields {
            match (&def.default, def.merge) {
                (Some(default), _) => {
                    fields.insert(name.clone(), default.clone());
                }
                (None, MergePolicy::Append) => {
                    fields.insert(name.clone(), Value::Array(vec![]));
                }
                (None, MergePolicy::Replace) => {}
            }
        }

        Self { fields }
    }

    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Apply a delta using the schema's merge policies.
    ///
    /// Every write is checked before any is applied.
    pub fn apply(&mut self, schema: &StateSchema, delta: &StateDelta) -> Result<(), StateError> {
        for write in delta.writes() {
            let field = write.field();
            if field.starts_with(RESERVED_PREFIX) {
                return Err(StateError::ReservedField(field.to_string()));
            }
            match (schema.policy(field), write.policy()) {
                (Some(declared), attempted) if declared != attempted => {
                    return Err(StateError::PolicyMismatch {
                        field: field.to_string(),
                        declared,
                        attempted,
                    });
                }
                (None, MergePolicy::Append) => {
                    return Err(StateError::UndeclaredAppend(field.to_string()));
                }
                _ => {}
            }
        }

        for write in delta.writes() {
            match write {
                FieldWrite::Replace { field, value } => {
                    self.fields.insert(field.clone(), value.clone());
                }
                FieldWrite::Append { field, values } => {
                    let entry = self
                        .fields
                        .entry(field.clone())
                        .or_insert(Value::Array(vec![]));
                    match entry {
                        Value::Array(items) => items.extend(values.iter().cloned()),
                        other => {
                            // A replace-typed default sneaked in; keep it as the first item
                            let previous = std::mem::take(other);
                            let mut items = vec![previous];
                            items.extend(values.iter().cloned());
                            *other = Value::Array(items);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Write a field directly, bypassing merge policies. Engine use only.
    pub(crate) fn set_internal(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub(crate) fn remove_internal(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a string field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get an unsigned integer field
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    /// Get an append field's items, empty if unset
    pub fn get_items(&self, key: &str) -> &[Value] {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get a nested field value using dot notation (e.g., "input.question")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// External response supplied to the node being resumed
    pub fn resume_response(&self) -> Option<&Value> {
        self.fields.get(RESUME_FIELD)
    }

    /// True when the current node is being re-entered after a suspension
    pub fn is_resume(&self) -> bool {
        self.fields.contains_key(RESUME_FIELD)
    }

    /// Convert state to a JSON object without engine-owned fields
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .filter(|(k, _)| !k.starts_with(RESERVED_PREFIX))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new()
            .replace_with_default("document", json!(""))
            .append("history")
    }

    #[test]
    fn test_empty_state() {
        let state = WorkflowState::empty();
        assert!(state.get("anything").is_none());
        assert!(!state.is_resume());
    }

    #[test]
    fn test_state_with_defaults() {
        let state = WorkflowState::new(&schema());

        assert_eq!(state.get("document"), Some(&json!("")));
        assert_eq!(state.get("history"), Some(&json!([])));
    }

    #[test]
    fn test_replace_policy() {
        let schema = schema();
        let mut state = WorkflowState::new(&schema);

        state
            .apply(&schema, &StateDelta::new().set("document", "first"))
            .unwrap();
        state
            .apply(&schema, &StateDelta::new().set("document", "second"))
            .unwrap();
        assert_eq!(state.get_str("document"), Some("second"));
    }

    #[test]
    fn test_append_policy_keeps_arrival_order() {
        let schema = schema();
        let mut state = WorkflowState::new(&schema);

        state
            .apply(&schema, &StateDelta::new().append("history", "item1"))
            .unwrap();
        state
            .apply(
                &schema,
                &StateDelta::new().extend("history", vec![json!("item2"), json!("item3")]),
            )
            .unwrap();

        assert_eq!(state.get_items("history"), &[json!("item1"), json!("item2"), json!("item3")]);
    }

    #[test]
    fn test_replace_on_append_field_is_rejected() {
        let schema = schema();
        let mut state = WorkflowState::new(&schema);

        let err = state
            .apply(&schema, &StateDelta::new().set("history", json!([])))
            .unwrap_err();
        assert!(matches!(err, StateError::PolicyMismatch { .. }));
    }

    #[test]
    fn test_rejected_delta_leaves_state_untouched() {
        let schema = schema();
        let mut state = WorkflowState::new(&schema);

        let delta = StateDelta::new()
            .set("document", "changed")
            .append("undeclared", "x");
        assert!(matches!(
            state.apply(&schema, &delta),
            Err(StateError::UndeclaredAppend(_))
        ));
        assert_eq!(state.get_str("document"), Some(""));
    }

    #[test]
    fn test_reserved_fields_cannot_be_written() {
        let schema = schema();
        let mut state = WorkflowState::new(&schema);

        let err = state
            .apply(&schema, &StateDelta::new().set(RESUME_FIELD, "x"))
            .unwrap_err();
        assert!(matches!(err, StateError::ReservedField(_)));
    }

    #[test]
    fn test_undeclared_field_uses_replace() {
        let schema = StateSchema::default();
        let mut state = WorkflowState::new(&schema);

        state
            .apply(&schema, &StateDelta::new().set("unknown", "first"))
            .unwrap();
        state
            .apply(&schema, &StateDelta::new().set("unknown", "second"))
            .unwrap();
        assert_eq!(state.get("unknown"), Some(&json!("second")));
    }

    #[test]
    fn test_get_path() {
        let schema = StateSchema::default();
        let mut state = WorkflowState::empty();
        state
            .apply(
                &schema,
                &StateDelta::new().set("input", json!({"question": {"text": "why?"}})),
            )
            .unwrap();

        assert_eq!(state.get_path("input.question.text"), Some(&json!("why?")));
        assert_eq!(state.get_path("input.nonexistent"), None);
    }

    #[test]
    fn test_to_json_hides_reserved_fields() {
        let mut state = WorkflowState::empty();
        state.set_internal("a", json!(1));
        state.set_internal(RESUME_FIELD, json!("yes"));

        assert!(state.is_resume());
        let json = state.to_json();
        assert_eq!(json, json!({"a": 1}));
    }

    #[test]
    fn test_serialization_is_key_ordered() {
        let mut state = WorkflowState::empty();
        state.set_internal("zeta", json!(1));
        state.set_internal("alpha", json!(2));

        let text = serde_json::to_string(&state).unwrap();
        assert_eq!(text, r#"{"alpha":2,"zeta":1}"#);
    }
}
