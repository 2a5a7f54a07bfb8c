// SPDX-License-Identifier: MIT

//! Node contract - the shape every business-logic step conforms to
//!
//! A node inspects the accumulated state and returns a `NextStep`:
//! - `Advance` - move to another node, continuing in the same call
//! - `Suspend` - park the conversation until a human responds
//! - `Terminal` - finish the workflow

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;
use crate::workflow::state::{StateDelta, StateSchema, WorkflowState};

/// What a node wants the engine to do next
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Advance { next: String, delta: StateDelta },
    Suspend { payload: Value, delta: StateDelta },
    Terminal { delta: StateDelta },
}

impl NextStep {
    pub fn advance(next: impl Into<String>, delta: StateDelta) -> Self {
        Self::Advance {
            next: next.into(),
            delta,
        }
    }

    pub fn suspend(payload: Value, delta: StateDelta) -> Self {
        Self::Suspend { payload, delta }
    }

    pub fn terminal(delta: StateDelta) -> Self {
        Self::Terminal { delta }
    }

    pub fn delta(&self) -> &StateDelta {
        match self {
            NextStep::Advance { delta, .. }
            | NextStep::Suspend { delta, .. }
            | NextStep::Terminal { delta } => delta,
        }
    }
}

/// Where a conversation's execution stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum NodeCursor {
    Node(String),
    Done,
}

impl NodeCursor {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, NodeCursor::Done)
    }

    pub fn node_name(&self) -> Option<&str> {
        match self {
            NodeCursor::Node(name) => Some(name),
            NodeCursor::Done => None,
        }
    }
}

/// Core trait for workflow nodes
#[async_trait]
pub trait Node: Send + Sync {
    /// Returns the node name, unique within a workflow
    fn name(&self) -> &str;

    /// State fields this node reads or writes
    fn schema(&self) -> StateSchema {
        StateSchema::default()
    }

    /// Node to continue with when `step` fails
    fn fallback(&self) -> Option<&str> {
        None
    }

    /// Run one transition against the accumulated state.
    ///
    /// On resume the external response is available through
    /// `state.resume_response()`.
    async fn step(&self, state: &WorkflowState) -> Result<NextStep, NodeError>;
}

type TransitionFn = dyn Fn(&WorkflowState) -> Result<NextStep, NodeError> + Send + Sync;

/// Node backed by a plain transition function
pub struct FnNode {
    name: String,
    transition: Box<TransitionFn>,
}

impl FnNode {
    pub fn new<F>(name: &str, transition: F) -> Self
    where
        F: Fn(&WorkflowState) -> Result<NextStep, NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            transition: Box::new(transition),
        }
    }
}

#[async_trait]
impl Node for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, state: &WorkflowState) -> Result<NextStep, NodeError> {
        (self.transition)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_node() {
        let node = FnNode::new("greet", |state| {
            let name = state.get_str("name").unwrap_or("world");
            Ok(NextStep::terminal(
                StateDelta::new().set("greeting", format!("hello {}", name)),
            ))
        });
        assert_eq!(node.name(), "greet");
        assert!(node.fallback().is_none());

        let step = node.step(&WorkflowState::empty()).await.unwrap();
        assert_eq!(step.delta().replaced("greeting"), Some(&json!("hello world")));
    }

    #[test]
    fn test_cursor_serialization() {
        let cursor = NodeCursor::node("review");
        assert_eq!(
            serde_json::to_value(&cursor).unwrap(),
            json!({"kind": "node", "name": "review"})
        );
        assert_eq!(
            serde_json::to_value(NodeCursor::Done).unwrap(),
            json!({"kind": "done"})
        );
        assert_eq!(cursor.node_name(), Some("review"));
        assert!(NodeCursor::Done.is_done());
    }
}
