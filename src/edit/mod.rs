// SPDX-License-Identifier: MIT

//! Document editing: fuzzy patching and the interactive edit loop

pub mod audit;
pub mod decision;
pub mod node;
pub mod patcher;

pub use audit::{EditAuditLog, EditRecord, FileAuditLog, MemoryAuditLog};
pub use decision::{CommandDecider, Decision, DecisionContext, DialogueTurn, EditAction, EditDecider};
pub use node::{EditLoopConfig, EditLoopNode};
pub use patcher::{patch, PatchResult, DEFAULT_THRESHOLD};
