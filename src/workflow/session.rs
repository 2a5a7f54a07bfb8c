// SPDX-License-Identifier: MIT

//! Logical sessions within a conversation
//!
//! A session is one unit of work (one question). Its id is generated once,
//! at creation, and callers thread it through every later call for that
//! unit of work. Nothing here derives an id from the clock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{SessionError, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Tracks sessions and the active-session pointer per conversation.
///
/// With a backing file, every mutation rewrites a snapshot atomically.
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    active: DashMap<String, String>,
    path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// In-memory manager
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            active: DashMap::new(),
            path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Manager backed by a JSON snapshot at `path`, loading existing sessions
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let mut manager = Self::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let sessions: Vec<Session> =
                    serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                        key: path.display().to_string(),
                        source,
                    })?;
                for session in sessions {
                    if session.status == SessionStatus::Active {
                        manager
                            .active
                            .insert(session.conversation_id.clone(), session.session_id.clone());
                    }
                    manager.sessions.insert(session.session_id.clone(), session);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::from(e).into()),
        }

        manager.path = Some(path);
        Ok(manager)
    }

    /// Start a new unit of work for `conversation_id`.
    ///
    /// Any session still active for the conversation is completed first.
    pub async fn create_session(&self, conversation_id: &str) -> Result<String, SessionError> {
        if let Some(previous) = self.get_active_session(conversation_id) {
            log::warn!(
                "Conversation {} still had active session {}, completing it",
                conversation_id,
                previous
            );
            self.mark_completed(&previous);
        }

        let session_id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        self.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                conversation_id: conversation_id.to_string(),
                created_at: Utc::now(),
                status: SessionStatus::Active,
            },
        );
        self.active
            .insert(conversation_id.to_string(), session_id.clone());
        self.persist().await?;

        log::info!(
            "Created session {} for conversation {}",
            session_id,
            conversation_id
        );
        Ok(session_id)
    }

    pub fn get_active_session(&self, conversation_id: &str) -> Option<String> {
        self.active
            .get(conversation_id)
            .map(|entry| entry.value().clone())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Sessions of one conversation, oldest first
    pub fn sessions_for(&self, conversation_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.conversation_id == conversation_id)
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub async fn complete_session(&self, session_id: &str) -> Result<(), SessionError> {
        if !self.sessions.contains_key(session_id) {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        self.mark_completed(session_id);
        self.persist().await?;
        Ok(())
    }

    fn mark_completed(&self, session_id: &str) {
        let conversation_id = match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.status = SessionStatus::Completed;
                session.conversation_id.clone()
            }
            None => return,
        };
        self.active
            .remove_if(&conversation_id, |_, active| active == session_id);
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let mut snapshot: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        snapshot.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|source| StoreError::Corrupt {
            key: path.display().to_string(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_complete() {
        let manager = SessionManager::new();
        let id = manager.create_session("t1").await.unwrap();

        assert_eq!(manager.get_active_session("t1"), Some(id.clone()));
        assert_eq!(manager.get(&id).unwrap().status, SessionStatus::Active);

        manager.complete_session(&id).await.unwrap();
        assert_eq!(manager.get_active_session("t1"), None);
        assert_eq!(manager.get(&id).unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_not_time_derived() {
        let manager = SessionManager::new();
        let a = manager.create_session("t1").await.unwrap();
        let b = manager.create_session("t1").await.unwrap();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        // The older session was closed when the new unit of work started
        assert_eq!(manager.get(&a).unwrap().status, SessionStatus::Completed);
        assert_eq!(manager.get_active_session("t1"), Some(b));
        assert_eq!(manager.sessions_for("t1").len(), 2);
    }

    #[tokio::test]
    async fn test_active_pointer_is_stable() {
        let manager = SessionManager::new();
        let id = manager.create_session("t1").await.unwrap();

        for _ in 0..5 {
            assert_eq!(manager.get_active_session("t1").as_deref(), Some(id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let manager = SessionManager::new();
        let a = manager.create_session("t1").await.unwrap();
        let b = manager.create_session("t2").await.unwrap();

        manager.complete_session(&a).await.unwrap();
        assert_eq!(manager.get_active_session("t2"), Some(b));
    }

    #[tokio::test]
    async fn test_complete_unknown_session() {
        let manager = SessionManager::new();
        let err = manager.complete_session("nope").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_file_backing_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let manager = SessionManager::open(&path).await.unwrap();
        let done = manager.create_session("t1").await.unwrap();
        manager.complete_session(&done).await.unwrap();
        let active = manager.create_session("t1").await.unwrap();

        let reopened = SessionManager::open(&path).await.unwrap();
        assert_eq!(reopened.get_active_session("t1"), Some(active));
        assert_eq!(
            reopened.get(&done).unwrap().status,
            SessionStatus::Completed
        );
    }
}
