// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::nodes::{FINAL_DOCUMENT_FIELD, PUBLISHED_FIELD};
use crate::error::HookError;
use crate::workflow::checkpoint::is_valid_key;
use crate::workflow::engine::NodeCompletion;
use crate::workflow::hooks::NodeHook;

pub const ARTIFACT_FILE: &str = "study-notes.md";

/// Writes the published document to `<dir>/<session_id>/study-notes.md`.
///
/// Keyed only by the threaded session id, so a re-delivered completion
/// rewrites the same file.
pub struct ArtifactHook {
    dir: PathBuf,
}

impl ArtifactHook {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(session_id).join(ARTIFACT_FILE)
    }
}

#[async_trait]
impl NodeHook for ArtifactHook {
    fn name(&self) -> &str {
        "artifact"
    }

    async fn on_node_completed(&self, completion: &NodeCompletion) -> Result<(), HookError> {
        if completion.state.get(PUBLISHED_FIELD).and_then(|v| v.as_bool()) != Some(true) {
            return Ok(());
        }
        let session_id = completion
            .session_id
            .as_deref()
            .filter(|id| is_valid_key(id))
            .ok_or_else(|| HookError::new(self.name(), "completion carries no valid session id"))?;
        let document = completion
            .state
            .get_str(FINAL_DOCUMENT_FIELD)
            .ok_or_else(|| HookError::new(self.name(), "nothing published"))?;

        let path = self.path_for(session_id);
        let io = |e: std::io::Error| HookError::new("artifact", e.to_string());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        tokio::fs::write(&path, document).await.map_err(io)?;

        log::info!("Wrote study notes for session {} to {:?}", session_id, path);
        Ok(())
    }
}
