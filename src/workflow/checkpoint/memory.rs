// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ensure_matching_id, Checkpoint, CheckpointStore};
use crate::error::StoreError;

/// In-process checkpoint store.
///
/// `DashMap` shards its locks, so unrelated conversations do not contend;
/// a save swaps the whole value in one insert.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .checkpoints
            .get(conversation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        ensure_matching_id(conversation_id, checkpoint)?;
        self.checkpoints
            .insert(conversation_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.checkpoints.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::WorkflowState;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("t1").await.unwrap().is_none());

        let mut cp = Checkpoint::new("t1", "draft", WorkflowState::empty());
        store.save("t1", &cp).await.unwrap();

        cp.version = 1;
        store.save("t1", &cp).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().unwrap().version, 1);
        assert_eq!(store.len(), 1);

        store.delete("t1").await.unwrap();
        assert!(store.load("t1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_rejects_foreign_checkpoint() {
        let store = MemoryCheckpointStore::new();
        let cp = Checkpoint::new("t1", "draft", WorkflowState::empty());

        assert!(store.save("t2", &cp).await.is_err());
        assert!(store.load("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryCheckpointStore::new();
        assert!(store.delete("nobody").await.is_ok());
    }
}
