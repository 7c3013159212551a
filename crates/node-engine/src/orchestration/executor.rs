//! Compiled graph executor.
//!
//! A run starts at the entry node and follows one transition per step until
//! a transition selects `END`. Every completed node yields a snapshot of the
//! cumulative state. The stream is lazy: nothing runs until it is polled,
//! and dropping it stops the run at the next await point.

use super::nodes::GraphNode;
use super::types::{ExecutionSnapshot, GraphDefinition, GraphState, RouterFn, END};
use crate::events::{EventSink, WorkflowEvent};
use crate::{NodeEngineError, Result};
use async_stream::stream;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Stream of snapshots produced by [`CompiledGraph::run`].
///
/// The stream ends after the final node, or after a single `Err` item.
pub type SnapshotStream<S> = Pin<Box<dyn Stream<Item = Result<ExecutionSnapshot<S>>> + Send>>;

/// How control leaves a node.
pub(crate) enum Transition<S> {
    Static(String),
    Conditional {
        router: RouterFn<S>,
        branches: HashMap<String, String>,
    },
}

pub(crate) struct GraphInner<S: GraphState> {
    pub(crate) definition: GraphDefinition,
    pub(crate) entry: String,
    pub(crate) nodes: HashMap<String, Arc<dyn GraphNode<S>>>,
    pub(crate) transitions: HashMap<String, Transition<S>>,
    pub(crate) max_steps: u32,
    pub(crate) event_sink: Arc<dyn EventSink>,
}

impl<S: GraphState> GraphInner<S> {
    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::warn!("Failed to send graph event: {}", e);
        }
    }

    /// Resolve the successor of `node` given the merged state.
    fn next_node(&self, node: &str, state: &S) -> Result<String> {
        match self.transitions.get(node) {
            Some(Transition::Static(target)) => Ok(target.clone()),
            Some(Transition::Conditional { router, branches }) => {
                let key = router(state);
                branches
                    .get(key)
                    .cloned()
                    .ok_or_else(|| NodeEngineError::UnmappedBranch {
                        node: node.to_string(),
                        key: key.to_string(),
                    })
            }
            None => Err(NodeEngineError::failed(format!(
                "Node '{}' has no outgoing transition",
                node
            ))),
        }
    }
}

/// An immutable, validated graph. Cheap to clone and safe to run concurrently.
pub struct CompiledGraph<S: GraphState> {
    inner: Arc<GraphInner<S>>,
}

impl<S: GraphState> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: GraphState> CompiledGraph<S> {
    pub(crate) fn from_inner(inner: GraphInner<S>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.inner.definition.name
    }

    /// Declarative description the graph was compiled from.
    pub fn definition(&self) -> &GraphDefinition {
        &self.inner.definition
    }

    /// Maximum node executions per run.
    pub fn max_steps(&self) -> u32 {
        self.inner.max_steps
    }

    /// Start a run and stream one snapshot per completed node.
    ///
    /// A node error ends the stream with `NodeEngineError::NodeFatal`.
    pub fn run(&self, initial: S) -> SnapshotStream<S> {
        let inner = Arc::clone(&self.inner);
        let execution_id = format!("exec-{}", uuid::Uuid::new_v4());

        Box::pin(stream! {
            let workflow_id = inner.definition.name.clone();
            let mut state = initial;
            let mut current = inner.entry.clone();
            let mut step: u32 = 0;

            inner.emit(WorkflowEvent::WorkflowStarted {
                workflow_id: workflow_id.clone(),
                execution_id: execution_id.clone(),
            });

            loop {
                if step >= inner.max_steps {
                    let error = NodeEngineError::ExecutionLimit(inner.max_steps);
                    inner.emit(WorkflowEvent::WorkflowFailed {
                        workflow_id: workflow_id.clone(),
                        execution_id: execution_id.clone(),
                        error: error.to_string(),
                    });
                    yield Err(error);
                    return;
                }

                let node = match inner.nodes.get(&current) {
                    Some(node) => Arc::clone(node),
                    None => {
                        yield Err(NodeEngineError::failed(format!(
                            "Node '{}' not found in graph",
                            current
                        )));
                        return;
                    }
                };

                step += 1;
                inner.emit(WorkflowEvent::NodeStarted {
                    node_id: current.clone(),
                    execution_id: execution_id.clone(),
                    step,
                });

                let node_start = Instant::now();
                let update = match node.run(&state).await {
                    Ok(update) => update,
                    Err(e) => {
                        let message = e.to_string();
                        log::error!("Node '{}' failed: {}", current, message);
                        inner.emit(WorkflowEvent::NodeFailed {
                            node_id: current.clone(),
                            execution_id: execution_id.clone(),
                            error: message.clone(),
                        });
                        inner.emit(WorkflowEvent::WorkflowFailed {
                            workflow_id: workflow_id.clone(),
                            execution_id: execution_id.clone(),
                            error: message.clone(),
                        });
                        yield Err(NodeEngineError::NodeFatal {
                            node: current.clone(),
                            message,
                        });
                        return;
                    }
                };
                state.apply(update);
                let duration_ms = node_start.elapsed().as_millis() as u64;

                inner.emit(WorkflowEvent::NodeCompleted {
                    node_id: current.clone(),
                    execution_id: execution_id.clone(),
                    step,
                    duration_ms,
                });

                yield Ok(ExecutionSnapshot {
                    execution_id: execution_id.clone(),
                    step,
                    node: current.clone(),
                    duration_ms,
                    state: state.clone(),
                });

                let next = match inner.next_node(&current, &state) {
                    Ok(next) => next,
                    Err(e) => {
                        inner.emit(WorkflowEvent::WorkflowFailed {
                            workflow_id: workflow_id.clone(),
                            execution_id: execution_id.clone(),
                            error: e.to_string(),
                        });
                        yield Err(e);
                        return;
                    }
                };

                if next == END {
                    inner.emit(WorkflowEvent::WorkflowCompleted {
                        workflow_id: workflow_id.clone(),
                        execution_id: execution_id.clone(),
                        steps: step,
                    });
                    return;
                }
                log::trace!("'{}' -> '{}'", current, next);
                current = next;
            }
        })
    }

    /// Run to completion and return the final cumulative state.
    pub async fn invoke(&self, initial: S) -> Result<S> {
        let mut stream = self.run(initial);
        let mut last = None;
        while let Some(item) = stream.next().await {
            last = Some(item?.state);
        }
        last.ok_or_else(|| NodeEngineError::failed("Run produced no snapshots"))
    }
}
