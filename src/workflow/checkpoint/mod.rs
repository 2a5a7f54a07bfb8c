// SPDX-License-Identifier: MIT

//! Durable per-conversation execution snapshots
//!
//! Backends:
//! - `MemoryCheckpointStore` - sharded in-process map
//! - `FileCheckpointStore` - one JSON file per conversation, atomic rename
//! - `RetryingStore` - wraps any backend with bounded backoff on transient errors

mod file;
mod memory;
mod retry;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use retry::{RetryPolicy, RetryingStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::workflow::node::NodeCursor;
use crate::workflow::state::WorkflowState;

/// Snapshot of one conversation's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: String,
    pub cursor: NodeCursor,
    pub state: WorkflowState,
    /// Set iff the conversation is suspended
    pub pending_interrupt: Option<Value>,
    /// Bumped on every persisted mutation
    pub version: u64,
}

impl Checkpoint {
    /// Fresh checkpoint positioned at `entry`
    pub fn new(conversation_id: &str, entry: &str, state: WorkflowState) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            cursor: NodeCursor::node(entry),
            state,
            pending_interrupt: None,
            version: 0,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.cursor.is_done()
    }

    /// Parked mid-graph without a pending interrupt, e.g. after a node failure
    pub fn is_halted(&self) -> bool {
        !self.is_terminal() && !self.is_suspended()
    }
}

/// Persistence backend for checkpoints.
///
/// Implementations must make `save` atomic, serialize writes per
/// conversation id, and never lock across different ids.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError>;
}

/// Reject saves whose checkpoint belongs to another conversation
pub(crate) fn ensure_matching_id(
    conversation_id: &str,
    checkpoint: &Checkpoint,
) -> Result<(), StoreError> {
    if checkpoint.conversation_id != conversation_id {
        return Err(StoreError::IdMismatch {
            expected: conversation_id.to_string(),
            actual: checkpoint.conversation_id.clone(),
        });
    }
    Ok(())
}

/// Conversation ids double as file names: `[A-Za-z0-9_-]{1,128}`
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_flags() {
        let mut cp = Checkpoint::new("t1", "draft", WorkflowState::empty());
        assert!(cp.is_halted());
        assert!(!cp.is_suspended());

        cp.pending_interrupt = Some(json!({"ask": "confirm"}));
        assert!(cp.is_suspended());
        assert!(!cp.is_halted());

        cp.pending_interrupt = None;
        cp.cursor = NodeCursor::Done;
        assert!(cp.is_terminal());
        assert!(!cp.is_halted());
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("t1"));
        assert!(is_valid_key("chat_42-a"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("../etc"));
        assert!(!is_valid_key("a b"));
        assert!(!is_valid_key(&"x".repeat(129)));
    }

    #[test]
    fn test_id_mismatch() {
        let cp = Checkpoint::new("t1", "draft", WorkflowState::empty());
        assert!(ensure_matching_id("t1", &cp).is_ok());
        assert!(matches!(
            ensure_matching_id("t2", &cp),
            Err(StoreError::IdMismatch { .. })
        ));
    }
}
