// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::StateError;

/// Schema declaring the workflow state's fields and merge policies
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    /// Optional type, checked against the default value
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// How writes are merged into the field
    #[serde(default, alias = "reducer")]
    pub merge: MergePolicy,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl StateFieldDef {
    pub fn new(merge: MergePolicy) -> Self {
        Self {
            field_type: None,
            merge,
            default: None,
        }
    }
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

/// Merge policy for writes into a state field
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// New value overwrites (default)
    #[default]
    Replace,
    /// New values are concatenated in arrival order
    Append,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Replace => f.write_str("replace"),
            MergePolicy::Append => f.write_str("append"),
        }
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a schema from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, StateError> {
        let schema: StateSchema = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Declare a replace field
    pub fn replace(mut self, name: &str) -> Self {
        self.fields
            .insert(name.to_string(), StateFieldDef::new(MergePolicy::Replace));
        self
    }

    /// Declare an append field
    pub fn append(mut self, name: &str) -> Self {
        self.fields
            .insert(name.to_string(), StateFieldDef::new(MergePolicy::Append));
        self
    }

    /// Declare a replace field with a default value
    pub fn replace_with_default(mut self, name: &str, default: serde_json::Value) -> Self {
        let mut def = StateFieldDef::new(MergePolicy::Replace);
        def.default = Some(default);
        self.fields.insert(name.to_string(), def);
        self
    }

    /// Merge policy of a declared field
    pub fn policy(&self, name: &str) -> Option<MergePolicy> {
        self.fields.get(name).map(|def| def.merge)
    }

    /// Check defaults against declared types and merge policies
    pub fn validate(&self) -> Result<(), StateError> {
        for (name, def) in &self.fields {
            if def.merge == MergePolicy::Append {
                if let Some(field_type) = def.field_type {
                    if field_type != FieldType::Array {
                        return Err(StateError::InvalidDefault {
                            field: name.clone(),
                            message: "append fields must have type array".to_string(),
                        });
                    }
                }
            }
            let Some(default) = &def.default else {
                continue;
            };
            if def.merge == MergePolicy::Append && !default.is_array() {
                return Err(StateError::InvalidDefault {
                    field: name.clone(),
                    message: "append default must be an array".to_string(),
                });
            }
            if let Some(field_type) = def.field_type {
                if !field_type.accepts(default) {
                    return Err(StateError::InvalidDefault {
                        field: name.clone(),
                        message: format!("default does not match type {:?}", field_type),
                    });
                }
            }
        }
        Ok(())
    }

    /// Merge another schema into this one.
    ///
    /// The same field may be declared twice only with the same policy.
    pub fn merge(&mut self, other: &StateSchema) -> Result<(), StateError> {
        for (name, def) in &other.fields {
            match self.fields.get(name) {
                Some(existing) if existing.merge != def.merge => {
                    return Err(StateError::ConflictingDeclaration {
                        field: name.clone(),
                        first: existing.merge,
                        second: def.merge,
                    });
                }
                Some(existing) if existing.default.is_some() => {}
                _ => {
                    self.fields.insert(name.clone(), def.clone());
                }
            }
        }
        Ok(())
    }
}
