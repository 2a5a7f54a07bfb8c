// SPDX-License-Identifier: MIT

//! State management for workflows
//!
//! This module provides:
//! - `StateSchema` - declares fields and their merge policies
//! - `StateDelta` - the writes a node returns
//! - `WorkflowState` - runtime state storage with policy enforcement

mod delta;
mod schema;
mod store;

pub use delta::{FieldWrite, StateDelta};
pub use schema::{FieldType, MergePolicy, StateFieldDef, StateSchema};
pub use store::{WorkflowState, ERROR_FIELD, RESERVED_PREFIX, RESUME_FIELD};
