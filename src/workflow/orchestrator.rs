// SPDX-License-Identifier: MIT

//! Public façade over the engine, checkpoints and sessions
//!
//! Every call validates its input first, claims the conversation, loads the
//! latest checkpoint and hands back either the final result or the
//! interrupt payload with the continuation token to answer it with.

use serde_json::Value;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::workflow::checkpoint::{is_valid_key, Checkpoint, CheckpointStore};
use crate::workflow::engine::{ConversationGuard, RunResult, WorkflowEngine, SESSION_FIELD};
use crate::workflow::hooks::HookRegistry;
use crate::workflow::session::SessionManager;
use crate::workflow::state::{StateDelta, WorkflowState};

/// State field holding the initial input of a unit of work
pub const INPUT_FIELD: &str = "input";

/// What a start/resume/retry call produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Suspended {
        payload: Value,
        session_id: String,
        /// Checkpoint version to pass back to `resume_from`
        continuation: u64,
    },
    Completed {
        result: Value,
        session_id: String,
    },
}

impl Outcome {
    pub fn session_id(&self) -> &str {
        match self {
            Outcome::Suspended { session_id, .. } | Outcome::Completed { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

pub struct Orchestrator {
    engine: WorkflowEngine,
    store: Arc<dyn CheckpointStore>,
    sessions: Arc<SessionManager>,
    hooks: HookRegistry,
}

impl Orchestrator {
    pub fn new(engine: WorkflowEngine, sessions: Arc<SessionManager>, hooks: HookRegistry) -> Self {
        let store = engine.store();
        Self {
            engine,
            store,
            sessions,
            hooks,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Begin a new unit of work.
    ///
    /// A terminal conversation starts over with a new session; a suspended
    /// or halted one must be resumed or retried instead.
    pub async fn start(
        &self,
        conversation_id: &str,
        initial_input: Value,
    ) -> Result<Outcome, WorkflowError> {
        validate_conversation_id(conversation_id)?;
        validate_input(&initial_input)?;

        let guard = self.engine.acquire(conversation_id)?;
        let version = match self.store.load(conversation_id).await? {
            None => 0,
            Some(cp) if cp.is_terminal() => {
                log::info!(
                    "Conversation {} finished v{}, starting a new unit of work",
                    conversation_id,
                    cp.version
                );
                cp.version
            }
            Some(cp) if cp.is_suspended() => {
                return Err(WorkflowError::Suspended {
                    conversation_id: conversation_id.to_string(),
                })
            }
            Some(cp) => {
                return Err(WorkflowError::Halted {
                    conversation_id: conversation_id.to_string(),
                    node: cp.cursor.node_name().unwrap_or_default().to_string(),
                })
            }
        };

        let session_id = self.sessions.create_session(conversation_id).await?;

        let mut state = self.engine.initial_state();
        state.apply(
            self.engine.schema(),
            &StateDelta::new()
                .set(INPUT_FIELD, initial_input)
                .set(SESSION_FIELD, session_id.as_str()),
        )?;

        let mut checkpoint = self.engine.new_checkpoint(conversation_id, state);
        checkpoint.version = version + 1;
        self.store.save(conversation_id, &checkpoint).await?;

        log::info!(
            "Started conversation {} with session {}",
            conversation_id,
            session_id
        );
        let result = self
            .engine
            .run_guarded(&guard, checkpoint, &self.hooks)
            .await?;
        self.finish(&guard, result).await
    }

    /// Answer the pending interrupt
    pub async fn resume(
        &self,
        conversation_id: &str,
        response: Value,
    ) -> Result<Outcome, WorkflowError> {
        self.resume_checked(conversation_id, None, response).await
    }

    /// Answer the pending interrupt only if it is still the one identified
    /// by `continuation`
    pub async fn resume_from(
        &self,
        conversation_id: &str,
        continuation: u64,
        response: Value,
    ) -> Result<Outcome, WorkflowError> {
        self.resume_checked(conversation_id, Some(continuation), response)
            .await
    }

    async fn resume_checked(
        &self,
        conversation_id: &str,
        continuation: Option<u64>,
        response: Value,
    ) -> Result<Outcome, WorkflowError> {
        validate_conversation_id(conversation_id)?;

        let guard = self.engine.acquire(conversation_id)?;
        let checkpoint = self.load_existing(conversation_id).await?;
        if !checkpoint.is_suspended() {
            return Err(WorkflowError::NotSuspended {
                conversation_id: conversation_id.to_string(),
            });
        }
        if let Some(actual) = continuation {
            if actual != checkpoint.version {
                return Err(WorkflowError::StaleContinuation {
                    conversation_id: conversation_id.to_string(),
                    expected: checkpoint.version,
                    actual,
                });
            }
        }

        let result = self
            .engine
            .resume_guarded(&guard, checkpoint, response, &self.hooks)
            .await?;
        self.finish(&guard, result).await
    }

    /// Re-drive a conversation parked by a node failure from its cursor
    pub async fn retry(&self, conversation_id: &str) -> Result<Outcome, WorkflowError> {
        validate_conversation_id(conversation_id)?;

        let guard = self.engine.acquire(conversation_id)?;
        let checkpoint = self.load_existing(conversation_id).await?;
        if !checkpoint.is_halted() {
            return Err(WorkflowError::NothingToRetry {
                conversation_id: conversation_id.to_string(),
            });
        }

        log::info!(
            "Retrying conversation {} at {:?}",
            conversation_id,
            checkpoint.cursor
        );
        let result = self
            .engine
            .run_guarded(&guard, checkpoint, &self.hooks)
            .await?;
        self.finish(&guard, result).await
    }

    pub async fn get_state(&self, conversation_id: &str) -> Result<Checkpoint, WorkflowError> {
        validate_conversation_id(conversation_id)?;
        self.load_existing(conversation_id).await
    }

    /// Delete the conversation's checkpoint and close its active session.
    ///
    /// An idle conversation is claimed for the duration of the delete so no
    /// call can start against it. An in-flight call is flagged instead and
    /// stops before its next persist.
    pub async fn delete_thread(&self, conversation_id: &str) -> Result<(), WorkflowError> {
        validate_conversation_id(conversation_id)?;

        let _claim = loop {
            match self.engine.acquire(conversation_id) {
                Ok(guard) => break Some(guard),
                Err(WorkflowError::ConcurrentAccess { .. }) => {
                    if self.engine.cancel(conversation_id) {
                        log::warn!(
                            "Conversation {} deleted while a call was in flight",
                            conversation_id
                        );
                        break None;
                    }
                    // The call finished in between; claim again
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        };
        self.store.delete(conversation_id).await?;

        if let Some(session_id) = self.sessions.get_active_session(conversation_id) {
            self.sessions.complete_session(&session_id).await?;
        }
        log::info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    async fn load_existing(&self, conversation_id: &str) -> Result<Checkpoint, WorkflowError> {
        self.store
            .load(conversation_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }

    async fn finish(
        &self,
        guard: &ConversationGuard,
        result: RunResult,
    ) -> Result<Outcome, WorkflowError> {
        match result {
            RunResult::Suspended {
                payload,
                checkpoint,
            } => Ok(Outcome::Suspended {
                payload,
                session_id: self.session_of(guard, &checkpoint.state)?,
                continuation: checkpoint.version,
            }),
            RunResult::Completed { final_state } => {
                let session_id = self.session_of(guard, &final_state)?;
                if let Err(e) = self.sessions.complete_session(&session_id).await {
                    log::warn!("Could not complete session {}: {}", session_id, e);
                }
                Ok(Outcome::Completed {
                    result: final_state.to_json(),
                    session_id,
                })
            }
        }
    }

    fn session_of(
        &self,
        guard: &ConversationGuard,
        state: &WorkflowState,
    ) -> Result<String, WorkflowError> {
        state
            .get_str(SESSION_FIELD)
            .map(String::from)
            .or_else(|| self.sessions.get_active_session(guard.conversation_id()))
            .ok_or_else(|| {
                WorkflowError::validation(format!(
                    "conversation '{}' has no session",
                    guard.conversation_id()
                ))
            })
    }
}

/// Conversation ids are 1-128 characters of `[A-Za-z0-9_-]`
pub fn validate_conversation_id(conversation_id: &str) -> Result<(), WorkflowError> {
    if is_valid_key(conversation_id) {
        Ok(())
    } else {
        Err(WorkflowError::validation(format!(
            "invalid conversation id '{}': expected 1-128 characters of [A-Za-z0-9_-]",
            conversation_id
        )))
    }
}

fn validate_input(input: &Value) -> Result<(), WorkflowError> {
    let blank = match input {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if blank {
        return Err(WorkflowError::validation("initial input is missing"));
    }
    Ok(())
}
