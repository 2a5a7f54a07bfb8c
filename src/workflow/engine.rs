// SPDX-License-Identifier: MIT

//! Resumable workflow executor
//!
//! Drives one conversation through the registered nodes until a node
//! suspends or the graph terminates, persisting a checkpoint after every
//! successful step.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{NodeError, WorkflowError};
use crate::workflow::checkpoint::{Checkpoint, CheckpointStore};
use crate::workflow::node::{NextStep, NodeCursor};
use crate::workflow::registry::NodeRegistry;
use crate::workflow::state::{StateDelta, StateSchema, WorkflowState, ERROR_FIELD, RESUME_FIELD};

/// Safety limit on node invocations per run/resume call
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// State field holding the session id threaded through a unit of work
pub const SESSION_FIELD: &str = "session_id";

/// Result of a run or resume call
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Suspended {
        payload: Value,
        checkpoint: Checkpoint,
    },
    Completed {
        final_state: WorkflowState,
    },
}

/// A node step that was persisted as Advance or Terminal
#[derive(Debug, Clone)]
pub struct NodeCompletion {
    pub conversation_id: String,
    pub session_id: Option<String>,
    pub node: String,
    pub delta: StateDelta,
    /// State after the delta was applied
    pub state: WorkflowState,
    pub version: u64,
}

/// Notified after each persisted node completion
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn node_completed(&self, completion: &NodeCompletion);
}

/// Observer that ignores completions
pub struct NoopObserver;

#[async_trait]
impl StepObserver for NoopObserver {
    async fn node_completed(&self, _completion: &NodeCompletion) {}
}

type InFlight = Arc<DashMap<String, Arc<AtomicBool>>>;

/// Proof that the holder is the only call in flight for a conversation.
///
/// Released on drop.
pub struct ConversationGuard {
    conversation_id: String,
    cancelled: Arc<AtomicBool>,
    in_flight: InFlight,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.conversation_id);
    }
}

/// Node-graph executor bound to a checkpoint store
pub struct WorkflowEngine {
    registry: NodeRegistry,
    schema: StateSchema,
    entry: String,
    store: Arc<dyn CheckpointStore>,
    max_steps: u32,
    in_flight: InFlight,
}

impl WorkflowEngine {
    /// Build an engine; the first registered node is the entry node.
    ///
    /// Node schemas are merged into `schema`, and every declared fallback
    /// must name a registered node.
    pub fn new(
        registry: NodeRegistry,
        schema: StateSchema,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self, WorkflowError> {
        let entry = registry.first().ok_or(WorkflowError::EmptyGraph)?.to_string();

        let mut schema = schema;
        for name in registry.names() {
            let Some(node) = registry.get(name) else {
                continue;
            };
            schema.merge(&node.schema())?;
            if let Some(fallback) = node.fallback() {
                if !registry.contains(fallback) {
                    return Err(WorkflowError::UnknownNode(fallback.to_string()));
                }
            }
        }
        schema.validate()?;

        log::info!(
            "Built workflow engine with {} nodes, entry '{}'",
            registry.len(),
            entry
        );

        Ok(Self {
            registry,
            schema,
            entry,
            store,
            max_steps: DEFAULT_MAX_STEPS,
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Use another registered node as the entry node
    pub fn with_entry(mut self, entry: &str) -> Result<Self, WorkflowError> {
        if !self.registry.contains(entry) {
            return Err(WorkflowError::UnknownNode(entry.to_string()));
        }
        self.entry = entry.to_string();
        Ok(self)
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }

    /// State holding the schema defaults
    pub fn initial_state(&self) -> WorkflowState {
        WorkflowState::new(&self.schema)
    }

    /// Fresh checkpoint at the entry node
    pub fn new_checkpoint(&self, conversation_id: &str, state: WorkflowState) -> Checkpoint {
        Checkpoint::new(conversation_id, &self.entry, state)
    }

    /// Claim a conversation, failing if a call is already in flight
    pub fn acquire(&self, conversation_id: &str) -> Result<ConversationGuard, WorkflowError> {
        match self.in_flight.entry(conversation_id.to_string()) {
            Entry::Occupied(_) => Err(WorkflowError::ConcurrentAccess {
                conversation_id: conversation_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let cancelled = Arc::new(AtomicBool::new(false));
                slot.insert(cancelled.clone());
                Ok(ConversationGuard {
                    conversation_id: conversation_id.to_string(),
                    cancelled,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// Flag an in-flight call so it stops before its next persist.
    ///
    /// Returns false when nothing was in flight.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.in_flight.get(conversation_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.in_flight.contains_key(conversation_id)
    }

    /// Run from the checkpoint's cursor
    pub async fn run(&self, checkpoint: Checkpoint) -> Result<RunResult, WorkflowError> {
        let guard = self.acquire(&checkpoint.conversation_id)?;
        self.run_guarded(&guard, checkpoint, &NoopObserver).await
    }

    /// Re-enter the suspended node with an external response
    pub async fn resume(
        &self,
        checkpoint: Checkpoint,
        response: Value,
    ) -> Result<RunResult, WorkflowError> {
        let guard = self.acquire(&checkpoint.conversation_id)?;
        self.resume_guarded(&guard, checkpoint, response, &NoopObserver)
            .await
    }

    pub async fn run_guarded(
        &self,
        guard: &ConversationGuard,
        checkpoint: Checkpoint,
        observer: &dyn StepObserver,
    ) -> Result<RunResult, WorkflowError> {
        check_guard(guard, &checkpoint)?;
        if checkpoint.is_suspended() {
            return Err(WorkflowError::Suspended {
                conversation_id: checkpoint.conversation_id,
            });
        }
        self.drive(guard, checkpoint, observer).await
    }

    pub async fn resume_guarded(
        &self,
        guard: &ConversationGuard,
        checkpoint: Checkpoint,
        response: Value,
        observer: &dyn StepObserver,
    ) -> Result<RunResult, WorkflowError> {
        check_guard(guard, &checkpoint)?;
        if !checkpoint.is_suspended() || checkpoint.is_terminal() {
            return Err(WorkflowError::NotSuspended {
                conversation_id: checkpoint.conversation_id,
            });
        }

        let mut checkpoint = checkpoint;
        checkpoint.state.set_internal(RESUME_FIELD, response);
        log::info!(
            "Resuming conversation {} at {:?}",
            checkpoint.conversation_id,
            checkpoint.cursor
        );
        self.drive(guard, checkpoint, observer).await
    }

    async fn drive(
        &self,
        guard: &ConversationGuard,
        checkpoint: Checkpoint,
        observer: &dyn StepObserver,
    ) -> Result<RunResult, WorkflowError> {
        let conversation_id = checkpoint.conversation_id.clone();
        let mut current = checkpoint;
        let mut steps = 0u32;

        loop {
            let name = match &current.cursor {
                NodeCursor::Done => {
                    return Ok(RunResult::Completed {
                        final_state: current.state,
                    })
                }
                NodeCursor::Node(name) => name.clone(),
            };

            if steps >= self.max_steps {
                log::error!(
                    "Conversation {} exceeded {} steps, parked at '{}'",
                    conversation_id,
                    self.max_steps,
                    name
                );
                return Err(WorkflowError::StepLimitExceeded {
                    limit: self.max_steps,
                });
            }
            steps += 1;

            let node = self
                .registry
                .get(&name)
                .ok_or_else(|| WorkflowError::UnknownNode(name.clone()))?;

            log::info!(
                "Conversation {} step {}: executing node {}",
                conversation_id,
                steps,
                name
            );

            let outcome = node.step(&current.state).await;

            // Work on a copy so a failed step leaves nothing behind
            let mut next = current.clone();
            next.state.remove_internal(RESUME_FIELD);
            next.pending_interrupt = None;
            next.version += 1;

            let step = match outcome {
                Ok(step) => step,
                Err(e) => match node.fallback() {
                    Some(fallback) => {
                        log::warn!(
                            "Node {} failed, following fallback {}: {}",
                            name,
                            fallback,
                            e
                        );
                        next.state.set_internal(
                            ERROR_FIELD,
                            json!({"node": name, "message": e.to_string()}),
                        );
                        next.cursor = NodeCursor::node(fallback);
                        self.persist(guard, &next).await?;
                        current = next;
                        continue;
                    }
                    None => {
                        log::error!("Node {} failed: {}", name, e);
                        return Err(WorkflowError::node_logic(name, e));
                    }
                },
            };

            if let Err(e) = next.state.apply(&self.schema, step.delta()) {
                log::error!("Node {} returned an invalid delta: {}", name, e);
                return Err(WorkflowError::node_logic(name, NodeError::State(e)));
            }

            match step {
                NextStep::Advance { next: target, delta } => {
                    if !self.registry.contains(&target) {
                        return Err(WorkflowError::node_logic(
                            name,
                            NodeError::Other(format!("advanced to unregistered node '{}'", target)),
                        ));
                    }
                    next.cursor = NodeCursor::node(target);
                    self.persist(guard, &next).await?;
                    self.notify(observer, &name, delta, &next).await;
                    current = next;
                }
                NextStep::Suspend { payload, .. } => {
                    let payload = if payload.is_null() { json!({}) } else { payload };
                    next.pending_interrupt = Some(payload.clone());
                    self.persist(guard, &next).await?;
                    log::info!(
                        "Conversation {} suspended at node {} (v{})",
                        conversation_id,
                        name,
                        next.version
                    );
                    return Ok(RunResult::Suspended {
                        payload,
                        checkpoint: next,
                    });
                }
                NextStep::Terminal { delta } => {
                    next.cursor = NodeCursor::Done;
                    self.persist(guard, &next).await?;
                    self.notify(observer, &name, delta, &next).await;
                    log::info!("Conversation {} completed at node {}", conversation_id, name);
                    return Ok(RunResult::Completed {
                        final_state: next.state,
                    });
                }
            }
        }
    }

    async fn persist(
        &self,
        guard: &ConversationGuard,
        checkpoint: &Checkpoint,
    ) -> Result<(), WorkflowError> {
        if guard.is_cancelled() {
            log::warn!(
                "Conversation {} was deleted mid-step, dropping v{}",
                checkpoint.conversation_id,
                checkpoint.version
            );
            return Err(WorkflowError::Cancelled {
                conversation_id: checkpoint.conversation_id.clone(),
            });
        }
        self.store
            .save(&checkpoint.conversation_id, checkpoint)
            .await?;
        // delete_thread may have landed between the check and the save
        if guard.is_cancelled() {
            self.store.delete(&checkpoint.conversation_id).await?;
            return Err(WorkflowError::Cancelled {
                conversation_id: checkpoint.conversation_id.clone(),
            });
        }
        Ok(())
    }

    async fn notify(
        &self,
        observer: &dyn StepObserver,
        node: &str,
        delta: StateDelta,
        checkpoint: &Checkpoint,
    ) {
        let completion = NodeCompletion {
            conversation_id: checkpoint.conversation_id.clone(),
            session_id: checkpoint.state.get_str(SESSION_FIELD).map(String::from),
            node: node.to_string(),
            delta,
            state: checkpoint.state.clone(),
            version: checkpoint.version,
        };
        observer.node_completed(&completion).await;
    }
}

fn check_guard(guard: &ConversationGuard, checkpoint: &Checkpoint) -> Result<(), WorkflowError> {
    if guard.conversation_id() != checkpoint.conversation_id {
        return Err(WorkflowError::validation(format!(
            "guard for '{}' used with checkpoint of '{}'",
            guard.conversation_id(),
            checkpoint.conversation_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::checkpoint::MemoryCheckpointStore;
    use crate::workflow::node::Node;
    use std::sync::Mutex;

    struct Harness {
        store: Arc<MemoryCheckpointStore>,
        engine: WorkflowEngine,
    }

    fn harness(registry: NodeRegistry, schema: StateSchema) -> Harness {
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = WorkflowEngine::new(registry, schema, store.clone()).unwrap();
        Harness { store, engine }
    }

    /// intake -> confirm (suspends once) -> finish
    fn confirm_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("intake", |state| {
                let question = state.get_str("input").unwrap_or_default().to_string();
                Ok(NextStep::advance(
                    "confirm",
                    StateDelta::new()
                        .set("question", question)
                        .append("trail", "intake"),
                ))
            })
            .unwrap();
        registry
            .register_fn("confirm", |state| match state.resume_response() {
                None => Ok(NextStep::suspend(
                    json!({"ask": "confirm", "question": state.get("question")}),
                    StateDelta::new().append("trail", "confirm:ask"),
                )),
                Some(answer) => Ok(NextStep::advance(
                    "finish",
                    StateDelta::new()
                        .set("answer", answer.clone())
                        .append("trail", "confirm:resumed"),
                )),
            })
            .unwrap();
        registry
            .register_fn("finish", |state| {
                assert!(!state.is_resume(), "resume response leaked past its node");
                Ok(NextStep::terminal(
                    StateDelta::new().append("trail", "finish"),
                ))
            })
            .unwrap();
        registry
    }

    fn trail_schema() -> StateSchema {
        StateSchema::new().append("trail")
    }

    fn fresh(engine: &WorkflowEngine, id: &str, input: &str) -> Checkpoint {
        let mut state = engine.initial_state();
        state.set_internal("input", json!(input));
        engine.new_checkpoint(id, state)
    }

    #[tokio::test]
    async fn test_runs_until_suspend_then_resumes_same_node() {
        let h = harness(confirm_registry(), trail_schema());
        let cp = fresh(&h.engine, "t1", "what is osmosis?");

        let result = h.engine.run(cp).await.unwrap();
        let suspended = match result {
            RunResult::Suspended {
                payload,
                checkpoint,
            } => {
                assert_eq!(payload["ask"], "confirm");
                assert_eq!(payload["question"], "what is osmosis?");
                checkpoint
            }
            other => panic!("Expected Suspended, got {:?}", other),
        };

        let stored = h.store.load("t1").await.unwrap().unwrap();
        assert_eq!(stored, suspended);
        assert_eq!(stored.cursor, NodeCursor::node("confirm"));
        assert_eq!(stored.version, 2);

        let result = h.engine.resume(stored, json!("yes")).await.unwrap();
        let RunResult::Completed { final_state } = result else {
            panic!("Expected Completed");
        };
        assert_eq!(final_state.get("answer"), Some(&json!("yes")));
        assert_eq!(
            final_state.get("trail"),
            Some(&json!(["intake", "confirm:ask", "confirm:resumed", "finish"]))
        );
        assert!(!final_state.is_resume());

        let stored = h.store.load("t1").await.unwrap().unwrap();
        assert!(stored.is_terminal());
        assert!(stored.pending_interrupt.is_none());
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_resume_without_pending_interrupt_is_rejected() {
        let h = harness(confirm_registry(), trail_schema());
        let cp = fresh(&h.engine, "t1", "q");

        let err = h.engine.resume(cp, json!("yes")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotSuspended { .. }));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_run_on_suspended_checkpoint_is_rejected() {
        let h = harness(confirm_registry(), trail_schema());
        let RunResult::Suspended { checkpoint, .. } =
            h.engine.run(fresh(&h.engine, "t1", "q")).await.unwrap()
        else {
            panic!("Expected Suspended");
        };

        let err = h.engine.run(checkpoint).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Suspended { .. }));
    }

    #[tokio::test]
    async fn test_failing_node_persists_nothing() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("first", |_| {
                Ok(NextStep::advance("broken", StateDelta::new().set("a", 1)))
            })
            .unwrap();
        registry
            .register_fn("broken", |_| Err(NodeError::generation("upstream 503")))
            .unwrap();
        let h = harness(registry, StateSchema::new());

        let err = h
            .engine
            .run(fresh(&h.engine, "t1", "q"))
            .await
            .unwrap_err();
        match err {
            WorkflowError::NodeLogic { node, source } => {
                assert_eq!(node, "broken");
                assert!(matches!(source, NodeError::Generation(_)));
            }
            other => panic!("Expected NodeLogic, got {:?}", other),
        }

        // Parked after the last successful step
        let stored = h.store.load("t1").await.unwrap().unwrap();
        assert_eq!(stored.cursor, NodeCursor::node("broken"));
        assert_eq!(stored.version, 1);
        assert!(stored.is_halted());
    }

    struct FlakyNode;

    #[async_trait]
    impl Node for FlakyNode {
        fn name(&self) -> &str {
            "generate"
        }

        fn fallback(&self) -> Option<&str> {
            Some("apologize")
        }

        async fn step(&self, _state: &WorkflowState) -> Result<NextStep, NodeError> {
            Err(NodeError::generation("model overloaded"))
        }
    }

    #[tokio::test]
    async fn test_fallback_transition_is_followed() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FlakyNode)).unwrap();
        registry
            .register_fn("apologize", |state| {
                let failed = state.get(ERROR_FIELD).cloned().unwrap_or_default();
                Ok(NextStep::terminal(
                    StateDelta::new().set("failed_node", failed["node"].clone()),
                ))
            })
            .unwrap();
        let h = harness(registry, StateSchema::new());

        let result = h.engine.run(fresh(&h.engine, "t1", "q")).await.unwrap();
        let RunResult::Completed { final_state } = result else {
            panic!("Expected Completed");
        };
        assert_eq!(final_state.get("failed_node"), Some(&json!("generate")));
    }

    #[tokio::test]
    async fn test_unknown_fallback_is_rejected_at_build() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FlakyNode)).unwrap();

        let store = Arc::new(MemoryCheckpointStore::new());
        let err = WorkflowEngine::new(registry, StateSchema::new(), store)
            .err()
            .unwrap();
        assert!(matches!(err, WorkflowError::UnknownNode(ref n) if n == "apologize"));
    }

    #[tokio::test]
    async fn test_advance_to_unregistered_node_fails() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("start", |_| Ok(NextStep::advance("nowhere", StateDelta::new())))
            .unwrap();
        let h = harness(registry, StateSchema::new());

        let err = h
            .engine
            .run(fresh(&h.engine, "t1", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NodeLogic { ref node, .. } if node == "start"));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_policy_violation_is_a_node_error() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("start", |_| {
                Ok(NextStep::terminal(StateDelta::new().set("trail", json!([]))))
            })
            .unwrap();
        let h = harness(registry, trail_schema());

        let err = h
            .engine
            .run(fresh(&h.engine, "t1", "q"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NodeLogic {
                source: NodeError::State(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("spin", |_| Ok(NextStep::advance("spin", StateDelta::new())))
            .unwrap();
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = WorkflowEngine::new(registry, StateSchema::new(), store.clone())
            .unwrap()
            .with_max_steps(5);

        let err = engine.run(fresh(&engine, "t1", "q")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StepLimitExceeded { limit: 5 }));
        assert_eq!(store.load("t1").await.unwrap().unwrap().version, 5);
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let h = harness(confirm_registry(), trail_schema());

        let guard = h.engine.acquire("t1").unwrap();
        assert!(h.engine.is_busy("t1"));
        assert!(matches!(
            h.engine.acquire("t1"),
            Err(WorkflowError::ConcurrentAccess { .. })
        ));
        // Other conversations are unaffected
        assert!(h.engine.acquire("t2").is_ok());

        drop(guard);
        assert!(!h.engine.is_busy("t1"));
        assert!(h.engine.acquire("t1").is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_guard_stops_before_persist() {
        let h = harness(confirm_registry(), trail_schema());
        let guard = h.engine.acquire("t1").unwrap();
        assert!(h.engine.cancel("t1"));

        let err = h
            .engine
            .run_guarded(&guard, fresh(&h.engine, "t1", "q"), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled { .. }));
        assert!(h.store.is_empty());
        assert!(!h.engine.cancel("t2"));
    }

    #[tokio::test]
    async fn test_resume_is_deterministic() {
        let a = harness(confirm_registry(), trail_schema());
        let b = harness(confirm_registry(), trail_schema());

        let RunResult::Suspended { checkpoint, .. } =
            a.engine.run(fresh(&a.engine, "t1", "q")).await.unwrap()
        else {
            panic!("Expected Suspended");
        };

        a.engine
            .resume(checkpoint.clone(), json!({"ok": true}))
            .await
            .unwrap();
        b.engine
            .resume(checkpoint, json!({"ok": true}))
            .await
            .unwrap();

        assert_eq!(
            a.store.load("t1").await.unwrap(),
            b.store.load("t1").await.unwrap()
        );
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl StepObserver for Recorder {
        async fn node_completed(&self, completion: &NodeCompletion) {
            self.0.lock().unwrap().push(completion.node.clone());
        }
    }

    #[tokio::test]
    async fn test_observer_sees_completed_nodes_only() {
        let h = harness(confirm_registry(), trail_schema());
        let recorder = Recorder(Mutex::new(vec![]));

        let guard = h.engine.acquire("t1").unwrap();
        let RunResult::Suspended { checkpoint, .. } = h
            .engine
            .run_guarded(&guard, fresh(&h.engine, "t1", "q"), &recorder)
            .await
            .unwrap()
        else {
            panic!("Expected Suspended");
        };
        h.engine
            .resume_guarded(&guard, checkpoint, json!("yes"), &recorder)
            .await
            .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["intake", "confirm", "finish"]
        );
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let err = WorkflowEngine::new(NodeRegistry::new(), StateSchema::new(), store)
            .err()
            .unwrap();
        assert!(matches!(err, WorkflowError::EmptyGraph));
    }

    #[test]
    fn test_with_entry() {
        let h = harness(confirm_registry(), trail_schema());
        assert_eq!(h.engine.entry(), "intake");

        let engine = h.engine.with_entry("confirm").unwrap();
        assert_eq!(engine.entry(), "confirm");
        assert!(engine.with_entry("missing").is_err());
    }
}
