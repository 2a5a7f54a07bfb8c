// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod engine;
pub mod hooks;
pub mod node;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod state;
