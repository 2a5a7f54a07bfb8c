// SPDX-License-Identifier: MIT

//! Append-only log of applied edits, one stream per session
//!
//! Diagnostics only: nothing in the control flow reads it back, and it is
//! kept out of checkpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::workflow::checkpoint::is_valid_key;

/// Characters kept from each excerpt
pub const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub timestamp: DateTime<Utc>,
    pub old_excerpt_preview: String,
    pub new_excerpt_preview: String,
    pub similarity: f64,
}

impl EditRecord {
    pub fn new(old_excerpt: &str, new_excerpt: &str, similarity: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            old_excerpt_preview: preview(old_excerpt),
            new_excerpt_preview: preview(new_excerpt),
            similarity,
        }
    }
}

/// First `PREVIEW_CHARS` characters, with an ellipsis when cut
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
pub trait EditAuditLog: Send + Sync {
    async fn append(&self, session_id: &str, record: &EditRecord) -> Result<(), StoreError>;

    /// Records of one session in append order
    async fn records(&self, session_id: &str) -> Result<Vec<EditRecord>, StoreError>;
}

#[derive(Default)]
pub struct MemoryAuditLog {
    records: DashMap<String, Vec<EditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EditAuditLog for MemoryAuditLog {
    async fn append(&self, session_id: &str, record: &EditRecord) -> Result<(), StoreError> {
        self.records
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn records(&self, session_id: &str) -> Result<Vec<EditRecord>, StoreError> {
        Ok(self
            .records
            .get(session_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

async fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// One JSON Lines file per session under a directory
pub struct FileAuditLog {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileAuditLog {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(session_id) {
            return Err(StoreError::InvalidKey(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.jsonl", session_id)))
    }
}

#[async_trait]
impl EditAuditLog for FileAuditLog {
    async fn append(&self, session_id: &str, record: &EditRecord) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        let mut line = serde_json::to_string(record).map_err(|source| StoreError::Corrupt {
            key: session_id.to_string(),
            source,
        })?;
        line.push('\n');

        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let written = {
            let _guard = lock.lock().await;
            append_line(&path, &line).await
        };
        drop(lock);
        // Only the map's own handle left means no writer is waiting
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        written
    }

    async fn records(&self, session_id: &str) -> Result<Vec<EditRecord>, StoreError> {
        let path = self.path_for(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                    key: session_id.to_string(),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn test_memory_log_appends_per_session() {
        let log = MemoryAuditLog::new();
        log.append("s1", &EditRecord::new("a", "b", 1.0)).await.unwrap();
        log.append("s1", &EditRecord::new("c", "d", 0.9)).await.unwrap();
        log.append("s2", &EditRecord::new("e", "f", 1.0)).await.unwrap();

        let records = log.records("s1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].old_excerpt_preview, "c");
        assert!(log.records("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_log_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::open(dir.path()).await.unwrap();

        log.append("s1", &EditRecord::new("rigid", "stiff", 1.0))
            .await
            .unwrap();
        let reopened = FileAuditLog::open(dir.path()).await.unwrap();
        reopened
            .append("s1", &EditRecord::new("kwick", "quick", 0.8))
            .await
            .unwrap();

        let records = reopened.records("s1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].new_excerpt_preview, "stiff");
        assert_eq!(records[1].similarity, 0.8);
        assert!(log.locks.is_empty());
        assert!(reopened.locks.is_empty());
    }

    #[tokio::test]
    async fn test_file_log_rejects_bad_session_key() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::open(dir.path()).await.unwrap();
        assert!(log.records("../x").await.is_err());
    }
}
