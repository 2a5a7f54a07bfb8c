// SPDX-License-Identifier: MIT

//! Interactive editing as a resumable node
//!
//! Phases: `awaiting_input -> deciding -> acting -> (awaiting_input |
//! deciding | done)`. The node suspends whenever it needs the human and
//! keeps deciding on its own while patches succeed autonomously.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use super::audit::{preview, EditAuditLog, EditRecord};
use super::decision::{Decision, DecisionContext, DialogueTurn, EditDecider};
use super::patcher::{patch, DEFAULT_THRESHOLD};
use crate::error::NodeError;
use crate::workflow::engine::SESSION_FIELD;
use crate::workflow::node::{NextStep, Node};
use crate::workflow::state::{StateDelta, StateSchema, WorkflowState};

pub const DIALOGUE_FIELD: &str = "edit_dialogue";
pub const PHASE_FIELD: &str = "edit_phase";
pub const EDIT_COUNT_FIELD: &str = "edit_count";
pub const FAILURES_FIELD: &str = "edit_failures";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    AwaitingInput,
    Deciding,
    Acting,
    Done,
}

impl fmt::Display for EditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditPhase::AwaitingInput => f.write_str("awaiting_input"),
            EditPhase::Deciding => f.write_str("deciding"),
            EditPhase::Acting => f.write_str("acting"),
            EditPhase::Done => f.write_str("done"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditLoopConfig {
    /// State field holding the document under edit
    pub document_field: String,
    /// Node to advance to on `complete`
    pub next: String,
    pub threshold: f64,
    /// Failed patches in a row before asking the human
    pub max_consecutive_failures: u32,
    /// Successful autonomous patches per invocation before pausing
    pub max_autonomous_edits: u32,
    /// Decide immediately on fresh entry instead of suspending first
    pub start_autonomously: bool,
}

impl Default for EditLoopConfig {
    fn default() -> Self {
        Self {
            document_field: "document".to_string(),
            next: "publish".to_string(),
            threshold: DEFAULT_THRESHOLD,
            max_consecutive_failures: 3,
            max_autonomous_edits: 10,
            start_autonomously: false,
        }
    }
}

pub struct EditLoopNode {
    name: String,
    config: EditLoopConfig,
    decider: Arc<dyn EditDecider>,
    audit: Arc<dyn EditAuditLog>,
}

/// Working copy of the loop's state for one invocation
struct Round {
    document: String,
    dialogue: Vec<DialogueTurn>,
    new_turns: Vec<DialogueTurn>,
    edits: u64,
    failures: u64,
    /// Successful patches, audited once the round yields a step
    pending_records: Vec<EditRecord>,
}

impl Round {
    fn say(&mut self, turn: DialogueTurn) {
        self.dialogue.push(turn.clone());
        self.new_turns.push(turn);
    }

    fn delta(&self, document_field: &str, phase: EditPhase) -> Result<StateDelta, NodeError> {
        let turns = self
            .new_turns
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(StateDelta::new()
            .set(document_field, self.document.as_str())
            .extend(DIALOGUE_FIELD, turns)
            .set(PHASE_FIELD, phase.to_string())
            .set(EDIT_COUNT_FIELD, self.edits)
            .set(FAILURES_FIELD, self.failures))
    }

    fn payload(&self, kind: &str, message: &str) -> Value {
        json!({
            "kind": kind,
            "message": message,
            "document": self.document,
            "edit_count": self.edits,
        })
    }
}

impl EditLoopNode {
    pub fn new(
        name: &str,
        config: EditLoopConfig,
        decider: Arc<dyn EditDecider>,
        audit: Arc<dyn EditAuditLog>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            decider,
            audit,
        }
    }

    fn suspend(&self, round: &Round, kind: &str, message: &str) -> Result<NextStep, NodeError> {
        log::debug!("{}: {} -> {}", self.name, kind, EditPhase::AwaitingInput);
        Ok(NextStep::suspend(
            round.payload(kind, message),
            round.delta(&self.config.document_field, EditPhase::AwaitingInput)?,
        ))
    }

    async fn flush_records(&self, state: &WorkflowState, records: Vec<EditRecord>) {
        if records.is_empty() {
            return;
        }
        let Some(session_id) = state.get_str(SESSION_FIELD) else {
            log::debug!("{}: no session id, edits not audited", self.name);
            return;
        };
        for record in &records {
            if let Err(e) = self.audit.append(session_id, record).await {
                log::warn!("{}: failed to audit edit for {}: {}", self.name, session_id, e);
            }
        }
    }

    /// Decide and act until the loop needs the human or is done
    async fn decide(&self, round: &mut Round) -> Result<NextStep, NodeError> {
        let mut autonomous = 0u32;
        loop {
            log::debug!("{}: {}", self.name, EditPhase::Deciding);
            let context = DecisionContext {
                document: round.document.clone(),
                dialogue: round.dialogue.clone(),
            };
            let action = self.decider.classify(&context).await?;
            let decision = self.decider.detail(&context, action).await?;
            if decision.action() != action {
                return Err(NodeError::InvalidDecision(format!(
                    "classified as {} but detailed as {}",
                    action,
                    decision.action()
                )));
            }

            log::debug!("{}: {} {}", self.name, EditPhase::Acting, action);
            match decision {
                Decision::Complete => {
                    log::info!("{}: editing done after {} edits", self.name, round.edits);
                    return Ok(NextStep::advance(
                        self.config.next.as_str(),
                        round.delta(&self.config.document_field, EditPhase::Done)?,
                    ));
                }
                Decision::Message { content } => {
                    round.say(DialogueTurn::assistant(content.as_str()));
                    return self.suspend(round, "message", &content);
                }
                Decision::Patch {
                    old_excerpt,
                    new_excerpt,
                    continue_autonomously,
                } => {
                    let result = patch(
                        &round.document,
                        &old_excerpt,
                        &new_excerpt,
                        self.config.threshold,
                    );

                    if !result.success {
                        round.failures += 1;
                        log::warn!(
                            "{}: patch failed ({} in a row): {:?}",
                            self.name,
                            round.failures,
                            preview(&old_excerpt)
                        );
                        round.say(DialogueTurn::system(format!(
                            "Could not find \"{}\" in the document (up to {} edits allowed).",
                            preview(&old_excerpt),
                            result.max_distance
                        )));
                        if round.failures >= u64::from(self.config.max_consecutive_failures) {
                            return self.suspend(
                                round,
                                "clarification",
                                &format!(
                                    "{} edits in a row did not match the document. Please quote the exact text to change.",
                                    round.failures
                                ),
                            );
                        }
                        continue;
                    }

                    let record = EditRecord::new(&old_excerpt, &new_excerpt, result.similarity);
                    round.pending_records.push(record);

                    round.document = result.document;
                    round.edits += 1;
                    round.failures = 0;
                    round.say(DialogueTurn::assistant(format!(
                        "Replaced \"{}\" with \"{}\" (similarity {:.2}).",
                        preview(result.matched_text.as_deref().unwrap_or_default()),
                        preview(&new_excerpt),
                        result.similarity
                    )));

                    if !continue_autonomously {
                        return self.suspend(round, "status", "Edit applied.");
                    }
                    autonomous += 1;
                    if autonomous >= self.config.max_autonomous_edits {
                        return self.suspend(
                            round,
                            "status",
                            &format!("Paused after {} autonomous edits.", autonomous),
                        );
                    }
                }
            }
        }
    }
}

/// A resume response is a plain string or an object with `message`
fn response_text(response: &Value) -> Result<String, NodeError> {
    match response {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| NodeError::Other("resume response has no `message`".to_string())),
        other => Err(NodeError::Other(format!(
            "resume response must be a string or {{\"message\": ...}}, got {}",
            other
        ))),
    }
}

#[async_trait]
impl Node for EditLoopNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> StateSchema {
        StateSchema::new()
            .replace(&self.config.document_field)
            .append(DIALOGUE_FIELD)
            .replace(PHASE_FIELD)
            .replace(EDIT_COUNT_FIELD)
            .replace(FAILURES_FIELD)
    }

    async fn step(&self, state: &WorkflowState) -> Result<NextStep, NodeError> {
        let document = state
            .get_str(&self.config.document_field)
            .ok_or_else(|| NodeError::missing_field(&self.config.document_field))?
            .to_string();
        let dialogue = state
            .get_items(DIALOGUE_FIELD)
            .iter()
            .cloned()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DialogueTurn>, _>>()?;

        let mut round = Round {
            document,
            dialogue,
            new_turns: vec![],
            pending_records: vec![],
            edits: state.get_u64(EDIT_COUNT_FIELD).unwrap_or(0),
            failures: state.get_u64(FAILURES_FIELD).unwrap_or(0),
        };

        match state.resume_response() {
            Some(response) => {
                round.say(DialogueTurn::human(response_text(response)?));
                round.failures = 0;
            }
            None if !self.config.start_autonomously => {
                return self.suspend(
                    &round,
                    "awaiting_input",
                    "Review the draft and describe an edit, or say done.",
                );
            }
            None => {}
        }

        let step = self.decide(&mut round).await?;
        // A failed round returns early, so its patches never reach the log
        self.flush_records(state, std::mem::take(&mut round.pending_records))
            .await;
        Ok(step)
    }
}
