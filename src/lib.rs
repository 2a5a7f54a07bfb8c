// SPDX-License-Identifier: MIT

//! studyflow - resumable study-material workflows
//!
//! - `workflow` - node graph engine, checkpoints, sessions, orchestrator
//! - `edit` - fuzzy patching and the interactive edit loop
//! - `pipeline` - the built-in `draft -> review -> publish` workflow
//! - `config` - environment configuration

pub mod config;
pub mod edit;
pub mod error;
pub mod pipeline;
pub mod workflow;
