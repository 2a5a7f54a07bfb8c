// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use super::{Checkpoint, CheckpointStore};
use crate::error::StoreError;

/// Bounded exponential backoff for transient infrastructure errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }
}

/// Store decorator that retries transient failures.
///
/// Non-transient errors and exhausted retries are returned unchanged.
pub struct RetryingStore {
    inner: Arc<dyn CheckpointStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn CheckpointStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn notify<'a>(
    op: &'static str,
    conversation_id: &'a str,
) -> impl FnMut(&StoreError, Duration) + 'a {
    move |err: &StoreError, dur: Duration| {
        log::warn!(
            "Retrying checkpoint {} for {} after {:?}: {}",
            op,
            conversation_id,
            dur,
            err
        );
    }
}

#[async_trait]
impl CheckpointStore for RetryingStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let op = || async { self.inner.load(conversation_id).await };
        op.retry(self.policy.backoff())
            .when(StoreError::is_transient)
            .notify(notify("load", conversation_id))
            .await
    }

    async fn save(&self, conversation_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let op = || async { self.inner.save(conversation_id, checkpoint).await };
        op.retry(self.policy.backoff())
            .when(StoreError::is_transient)
            .notify(notify("save", conversation_id))
            .await
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let op = || async { self.inner.delete(conversation_id).await };
        op.retry(self.policy.backoff())
            .when(StoreError::is_transient)
            .notify(notify("delete", conversation_id))
            .await
    }
}
