// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::NodeError;
use crate::workflow::node::{NextStep, Node};
use crate::workflow::orchestrator::INPUT_FIELD;
use crate::workflow::state::{StateDelta, StateSchema, WorkflowState};

pub const DOCUMENT_FIELD: &str = "document";
pub const FINAL_DOCUMENT_FIELD: &str = "final_document";
pub const PUBLISHED_FIELD: &str = "published";
pub const HISTORY_FIELD: &str = "history";

/// Produces study material for a question
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<String, NodeError>;
}

/// Offline generator rendering a fixed outline
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(&self, question: &str) -> Result<String, NodeError> {
        Ok(format!(
            "# Study notes\n\n## Question\n\n{question}\n\n## Key ideas\n\n\
             - Define the terms used in the question.\n\
             - Explain the mechanism step by step.\n\
             - Give one worked example.\n\n\
             ## Review questions\n\n\
             1. Summarize the answer in one sentence.\n\
             2. What would change if the main assumption did not hold?\n",
            question = question
        ))
    }
}

/// The question is the input itself or its `question` member
fn question_of(state: &WorkflowState) -> Result<String, NodeError> {
    match state.get(INPUT_FIELD) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(input) => input
            .get("question")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| NodeError::missing_field("input.question")),
        None => Err(NodeError::missing_field(INPUT_FIELD)),
    }
}

pub struct DraftNode {
    name: String,
    next: String,
    generator: Arc<dyn Generator>,
}

impl DraftNode {
    pub fn new(name: &str, next: &str, generator: Arc<dyn Generator>) -> Self {
        Self {
            name: name.to_string(),
            next: next.to_string(),
            generator,
        }
    }
}

#[async_trait]
impl Node for DraftNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> StateSchema {
        StateSchema::new()
            .replace(DOCUMENT_FIELD)
            .append(HISTORY_FIELD)
    }

    async fn step(&self, state: &WorkflowState) -> Result<NextStep, NodeError> {
        let question = question_of(state)?;
        log::info!("Drafting notes for: {}", question);
        let document = self.generator.generate(&question).await?;
        Ok(NextStep::advance(
            self.next.as_str(),
            StateDelta::new()
                .set(DOCUMENT_FIELD, document)
                .append(HISTORY_FIELD, self.name.as_str()),
        ))
    }
}

pub struct PublishNode {
    name: String,
}

impl PublishNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Node for PublishNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> StateSchema {
        StateSchema::new()
            .replace(FINAL_DOCUMENT_FIELD)
            .replace_with_default(PUBLISHED_FIELD, Value::Bool(false))
            .append(HISTORY_FIELD)
    }

    async fn step(&self, state: &WorkflowState) -> Result<NextStep, NodeError> {
        let document = state
            .get_str(DOCUMENT_FIELD)
            .ok_or_else(|| NodeError::missing_field(DOCUMENT_FIELD))?;
        Ok(NextStep::terminal(
            StateDelta::new()
                .set(FINAL_DOCUMENT_FIELD, document)
                .set(PUBLISHED_FIELD, true)
                .append(HISTORY_FIELD, self.name.as_str()),
        ))
    }
}
