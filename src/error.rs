// SPDX-License-Identifier: MIT

//! Typed error handling for studyflow
//!
//! One enum per subsystem, all built on thiserror:
//! - `WorkflowError` - engine and orchestrator failures surfaced to callers
//! - `NodeError` - a node's own processing failed
//! - `StateError` - merge-policy and schema violations
//! - `StoreError` - checkpoint and session persistence failures
//! - `SessionError`, `HookError`, `PatchNotFound`, `ConfigError`

use thiserror::Error;

use crate::workflow::state::MergePolicy;

/// Errors surfaced by the workflow engine and the orchestrator
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed conversation id or missing initial input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another run/resume is already in flight for this conversation
    #[error("Conversation '{conversation_id}' is busy, retry later")]
    ConcurrentAccess { conversation_id: String },

    #[error("Conversation '{conversation_id}' not found")]
    NotFound { conversation_id: String },

    /// Resume requested but nothing is pending
    #[error("Conversation '{conversation_id}' is not suspended")]
    NotSuspended { conversation_id: String },

    /// Start requested while the conversation waits for input
    #[error("Conversation '{conversation_id}' is suspended awaiting input, resume it instead")]
    Suspended { conversation_id: String },

    /// Start requested while the conversation is parked after a failure
    #[error("Conversation '{conversation_id}' is halted at node '{node}', retry it instead")]
    Halted {
        conversation_id: String,
        node: String,
    },

    /// Retry requested on a conversation that is not halted
    #[error("Conversation '{conversation_id}' has nothing to retry")]
    NothingToRetry { conversation_id: String },

    /// The response answers an older suspension than the persisted one
    #[error("Stale continuation for '{conversation_id}': expected {expected}, got {actual}")]
    StaleContinuation {
        conversation_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Node '{0}' is not registered")]
    UnknownNode(String),

    #[error("Node '{0}' is registered twice")]
    DuplicateNode(String),

    #[error("Workflow has no registered nodes")]
    EmptyGraph,

    /// A node's transition function failed; nothing was persisted
    #[error("Node '{node}' failed: {source}")]
    NodeLogic {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error("Max steps reached: {limit}")]
    StepLimitExceeded { limit: u32 },

    /// The checkpoint was deleted while a step was in flight
    #[error("Conversation '{conversation_id}' was deleted during execution")]
    Cancelled { conversation_id: String },

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl WorkflowError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a node logic error
    pub fn node_logic(node: impl Into<String>, source: NodeError) -> Self {
        Self::NodeLogic {
            node: node.into(),
            source,
        }
    }

    /// Whether the caller may retry the same call later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentAccess { .. } => true,
            Self::Store(e) => e.is_transient(),
            Self::Session(SessionError::Persist(e)) => e.is_transient(),
            _ => false,
        }
    }
}

/// Failure inside a node's own logic
#[derive(Debug, Error)]
pub enum NodeError {
    /// An upstream generation call failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A decision did not match the classified action
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Missing state field: {0}")]
    MissingField(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}

impl From<&str> for NodeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for NodeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for NodeError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}

/// Violations of the state schema
#[derive(Debug, Error)]
pub enum StateError {
    /// A write used a different policy than the field declares
    #[error("Field '{field}' is declared {declared}, cannot {attempted}")]
    PolicyMismatch {
        field: String,
        declared: MergePolicy,
        attempted: MergePolicy,
    },

    #[error("Field '{0}' must be declared with merge: append before appending")]
    UndeclaredAppend(String),

    #[error("Field '{0}' is reserved for the engine")]
    ReservedField(String),

    /// Two declarations disagree on a field's merge policy
    #[error("Field '{field}' declared both {first} and {second}")]
    ConflictingDeclaration {
        field: String,
        first: MergePolicy,
        second: MergePolicy,
    },

    #[error("Invalid default for field '{field}': {message}")]
    InvalidDefault { field: String, message: String },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid conversation key '{0}'")]
    InvalidKey(String),

    #[error("Checkpoint id mismatch: expected '{expected}', got '{actual}'")]
    IdMismatch { expected: String, actual: String },

    #[error("Stored record '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Transient failures are retried with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Persist(#[from] StoreError),
}

/// A side-effect hook failed
#[derive(Debug, Error)]
#[error("Hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// No span of the document came within the allowed edit distance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Excerpt not found within {max_distance} edits")]
pub struct PatchNotFound {
    pub max_distance: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_access_is_retryable() {
        let err = WorkflowError::ConcurrentAccess {
            conversation_id: "t1".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("t1"));
    }

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::unavailable("db down").is_transient());
        assert!(StoreError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
        assert!(!StoreError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_transient());
        assert!(!StoreError::InvalidKey("../x".into()).is_transient());
    }

    #[test]
    fn test_workflow_error_wraps_transient_store_error() {
        let err: WorkflowError = StoreError::unavailable("timeout").into();
        assert!(err.is_retryable());

        let err: WorkflowError = StoreError::InvalidKey("a/b".into()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_node_logic_carries_node_name() {
        let err = WorkflowError::node_logic("draft", NodeError::generation("upstream 503"));
        match &err {
            WorkflowError::NodeLogic { node, source } => {
                assert_eq!(node, "draft");
                assert!(matches!(source, NodeError::Generation(_)));
            }
            _ => panic!("Expected NodeLogic"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_policy_mismatch_message() {
        let err = StateError::PolicyMismatch {
            field: "history".into(),
            declared: MergePolicy::Append,
            attempted: MergePolicy::Replace,
        };
        assert_eq!(
            err.to_string(),
            "Field 'history' is declared append, cannot replace"
        );
    }

    #[test]
    fn test_node_error_from_str() {
        let err: NodeError = "boom".into();
        assert!(matches!(err, NodeError::Other(ref m) if m == "boom"));
    }
}
