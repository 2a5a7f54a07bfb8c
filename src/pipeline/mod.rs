// SPDX-License-Identifier: MIT

//! Study-notes pipeline: `draft -> review -> publish`
//!
//! `review` is the interactive edit loop. Publishing writes the notes to
//! the session's artifact directory through `ArtifactHook`.

mod artifact;
mod nodes;

pub use artifact::{ArtifactHook, ARTIFACT_FILE};
pub use nodes::{
    DraftNode, Generator, PublishNode, TemplateGenerator, DOCUMENT_FIELD, FINAL_DOCUMENT_FIELD,
    HISTORY_FIELD, PUBLISHED_FIELD,
};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::edit::{EditAuditLog, EditDecider, EditLoopConfig, EditLoopNode, FileAuditLog};
use crate::error::WorkflowError;
use crate::workflow::checkpoint::{CheckpointStore, FileCheckpointStore, RetryingStore};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::hooks::HookRegistry;
use crate::workflow::orchestrator::Orchestrator;
use crate::workflow::registry::NodeRegistry;
use crate::workflow::session::SessionManager;
use crate::workflow::state::StateSchema;

pub const DRAFT: &str = "draft";
pub const REVIEW: &str = "review";
pub const PUBLISH: &str = "publish";

/// Fields shared across the pipeline's nodes
const PIPELINE_SCHEMA: &str = r#"
input:
  merge: replace
session_id:
  type: string
  merge: replace
document:
  type: string
  default: ""
final_document:
  type: string
published:
  type: boolean
  default: false
history:
  type: array
  merge: append
"#;

pub fn pipeline_schema() -> Result<StateSchema, WorkflowError> {
    Ok(StateSchema::from_yaml(PIPELINE_SCHEMA)?)
}

/// Backends and collaborators the pipeline runs on
pub struct PipelineParts {
    pub store: Arc<dyn CheckpointStore>,
    pub sessions: Arc<SessionManager>,
    pub audit: Arc<dyn EditAuditLog>,
    pub generator: Arc<dyn Generator>,
    pub decider: Arc<dyn EditDecider>,
    pub artifact_dir: PathBuf,
}

/// Wire the pipeline nodes, hooks and engine into an orchestrator
pub fn assemble(config: &Config, parts: PipelineParts) -> Result<Orchestrator, WorkflowError> {
    let edit_config = EditLoopConfig {
        next: PUBLISH.to_string(),
        document_field: DOCUMENT_FIELD.to_string(),
        ..config.edit_loop()
    };

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(DraftNode::new(DRAFT, REVIEW, parts.generator)))?;
    registry.register(Arc::new(EditLoopNode::new(
        REVIEW,
        edit_config,
        parts.decider,
        parts.audit,
    )))?;
    registry.register(Arc::new(PublishNode::new(PUBLISH)))?;

    let store: Arc<dyn CheckpointStore> = Arc::new(RetryingStore::new(parts.store, config.retry));
    let engine = WorkflowEngine::new(registry, pipeline_schema()?, store)?
        .with_entry(DRAFT)?
        .with_max_steps(config.max_steps);

    let mut hooks = HookRegistry::new().with_retry(config.retry);
    hooks.on_node(PUBLISH, Arc::new(ArtifactHook::new(&parts.artifact_dir)));

    Ok(Orchestrator::new(engine, parts.sessions, hooks))
}

/// Open the file-backed stores under the data directory and assemble
pub async fn open(
    config: &Config,
    generator: Arc<dyn Generator>,
    decider: Arc<dyn EditDecider>,
) -> Result<Orchestrator, WorkflowError> {
    let store = FileCheckpointStore::open(config.checkpoint_dir()).await?;
    let sessions = SessionManager::open(config.sessions_file()).await?;
    let audit = FileAuditLog::open(config.audit_dir()).await?;
    log::debug!("Opened pipeline data under {:?}", config.data_dir);

    assemble(
        config,
        PipelineParts {
            store: Arc::new(store),
            sessions: Arc::new(sessions),
            audit: Arc::new(audit),
            generator,
            decider,
            artifact_dir: config.artifact_dir(),
        },
    )
}
