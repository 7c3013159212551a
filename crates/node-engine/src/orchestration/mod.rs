//! Graph orchestration: node abstraction, definitions and the executor.
//!
//! Graphs are built with [`crate::GraphBuilder`], validated once in
//! `compile`, and then run any number of times, concurrently if needed.

pub mod executor;
pub mod nodes;
pub mod types;

pub use executor::{CompiledGraph, SnapshotStream};
pub use nodes::{node_fn, FnNode, GraphNode, JsonState, StateDelta};
pub use types::{
    BranchKey, EdgeDefinition, ExecutionSnapshot, GraphDefinition, GraphState, END, START,
};
