// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use super::{ensure_matching_id, is_valid_key, Checkpoint, CheckpointStore};
use crate::error::StoreError;

/// Checkpoint store keeping one JSON file per conversation.
///
/// Saves go to a temporary file in the same directory and are renamed over
/// the target, so readers see either the old or the new checkpoint. Writes
/// for one id hold that id's mutex; other ids are never blocked.
pub struct FileCheckpointStore {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(conversation_id) {
            return Err(StoreError::InvalidKey(conversation_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", conversation_id)))
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the id's mutex once no other writer holds or awaits it
    fn release(&self, conversation_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(conversation_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn write_atomic(
        &self,
        conversation_id: &str,
        path: &Path,
        json: &[u8],
    ) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            conversation_id,
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.path_for(conversation_id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                key: conversation_id.to_string(),
                source,
            })?;
        Ok(Some(checkpoint))
    }

    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        ensure_matching_id(conversation_id, checkpoint)?;
        let path = self.path_for(conversation_id)?;
        let json = serde_json::to_vec_pretty(checkpoint).map_err(|source| StoreError::Corrupt {
            key: conversation_id.to_string(),
            source,
        })?;

        let lock = self.lock_for(conversation_id);
        let written = {
            let _guard = lock.lock().await;
            self.write_atomic(conversation_id, &path, &json).await
        };
        self.release(conversation_id, lock);
        written?;

        log::debug!(
            "Saved checkpoint {} v{} to {:?}",
            conversation_id,
            checkpoint.version,
            path
        );
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(conversation_id)?;
        let lock = self.lock_for(conversation_id);
        let removed = {
            let _guard = lock.lock().await;
            fs::remove_file(&path).await
        };
        self.release(conversation_id, lock);

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
