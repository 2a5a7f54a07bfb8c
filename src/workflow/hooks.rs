// SPDX-License-Identifier: MIT

//! Side-effect hooks fired after node completions
//!
//! Hooks run after the step is persisted and receive the session id the
//! orchestrator threaded into the state. A failing hook is retried with
//! backoff, then logged; it never fails or rolls back the workflow.

use async_trait::async_trait;
use backon::Retryable;
use futures::future::join_all;
use std::sync::Arc;

use crate::error::HookError;
use crate::workflow::checkpoint::RetryPolicy;
use crate::workflow::engine::{NodeCompletion, StepObserver};

#[async_trait]
pub trait NodeHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_node_completed(&self, completion: &NodeCompletion) -> Result<(), HookError>;
}

struct Registration {
    /// Only fire for this node; `None` fires for every node
    node: Option<String>,
    hook: Arc<dyn NodeHook>,
}

impl Registration {
    fn matches(&self, node: &str) -> bool {
        self.node.as_deref().map_or(true, |n| n == node)
    }
}

/// Hooks keyed by the node they observe
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Registration>,
    retry: RetryPolicy,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fire `hook` after every completion of `node`
    pub fn on_node(&mut self, node: &str, hook: Arc<dyn NodeHook>) {
        self.hooks.push(Registration {
            node: Some(node.to_string()),
            hook,
        });
    }

    /// Fire `hook` after every node completion
    pub fn on_any(&mut self, hook: Arc<dyn NodeHook>) {
        self.hooks.push(Registration { node: None, hook });
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every matching hook; returns how many succeeded
    pub async fn dispatch(&self, completion: &NodeCompletion) -> usize {
        let runs = self
            .hooks
            .iter()
            .filter(|r| r.matches(&completion.node))
            .map(|r| self.run_one(r.hook.as_ref(), completion));
        join_all(runs).await.into_iter().filter(|ok| *ok).count()
    }

    async fn run_one(&self, hook: &dyn NodeHook, completion: &NodeCompletion) -> bool {
        let attempt = || async { hook.on_node_completed(completion).await };
        let result = attempt
            .retry(self.retry.backoff())
            .notify(|err: &HookError, dur| {
                log::warn!("Retrying hook after {:?}: {}", dur, err);
            })
            .await;

        match result {
            Ok(()) => {
                log::debug!(
                    "Hook {} done for node {} of {}",
                    hook.name(),
                    completion.node,
                    completion.conversation_id
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Hook {} gave up for node {} of {}: {}",
                    hook.name(),
                    completion.node,
                    completion.conversation_id,
                    e
                );
                false
            }
        }
    }
}

#[async_trait]
impl StepObserver for HookRegistry {
    async fn node_completed(&self, completion: &NodeCompletion) {
        self.dispatch(completion).await;
    }
}
