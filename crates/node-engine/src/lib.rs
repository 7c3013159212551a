//! Node Engine - state-graph execution with conditional routing
//!
//! A graph is a set of named async nodes sharing one state type. Each node
//! reads the cumulative state and returns a partial update, which is merged
//! before the next transition is resolved. Runs are exposed as a lazy
//! stream of state snapshots.
//!
//! # Example
//!
//! ```ignore
//! use node_engine::{GraphBuilder, JsonState, StateDelta, node_fn, START, END};
//!
//! let graph = GraphBuilder::new("hello")
//!     .add_node("greet", node_fn(|_s: JsonState| async {
//!         Ok(StateDelta::new().with_update("greeting", "hi".into()))
//!     }))
//!     .add_edge(START, "greet")
//!     .add_edge("greet", END)
//!     .compile()?;
//!
//! let state = graph.invoke(JsonState::new()).await?;
//! ```

pub mod builder;
pub mod error;
pub mod events;
pub mod orchestration;
pub mod validation;

pub use builder::{GraphBuilder, DEFAULT_MAX_STEPS};
pub use error::{NodeEngineError, Result};
pub use events::{EventError, EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use orchestration::{
    node_fn, BranchKey, CompiledGraph, EdgeDefinition, ExecutionSnapshot, FnNode, GraphDefinition,
    GraphNode, GraphState, JsonState, SnapshotStream, StateDelta, END, START,
};
pub use validation::{validate_graph, ValidationError};
