// SPDX-License-Identifier: MIT

use crate::error::{NodeError, WorkflowError};
use crate::workflow::node::{FnNode, NextStep, Node};
use crate::workflow::state::WorkflowState;
use std::collections::HashMap;
use std::sync::Arc;

/// Name -> node map, in registration order
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node: Arc<dyn Node>) -> Result<(), WorkflowError> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(WorkflowError::DuplicateNode(name));
        }
        self.order.push(name.clone());
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Register a plain transition function under `name`
    pub fn register_fn<F>(&mut self, name: &str, transition: F) -> Result<(), WorkflowError>
    where
        F: Fn(&WorkflowState) -> Result<NextStep, NodeError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnNode::new(name, transition)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// First registered node
    pub fn first(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
