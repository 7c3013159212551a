//! Graph definition types.
//!
//! A graph is a set of named nodes plus one outgoing transition per node:
//! either a static edge or a conditional edge whose router output is looked
//! up in a branch table. `START` and `END` are sentinels and can never be
//! registered as nodes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel naming the implicit predecessor of the entry node.
pub const START: &str = "__start__";

/// Sentinel that terminates a run when selected as the next node.
pub const END: &str = "__end__";

/// State accumulated across one run.
///
/// `apply` must implement a shallow, last-write-wins merge: every key present
/// in the update replaces the prior value of that key, every other key is
/// left untouched.
pub trait GraphState: Clone + Send + Sync + 'static {
    /// Partial state returned by a node.
    type Update: Send + 'static;

    /// Merge a node's partial update into the cumulative state.
    fn apply(&mut self, update: Self::Update);
}

/// Discriminator returned by a router.
///
/// `all` must list every value the router can produce; `compile` checks each
/// of them against the branch table so an unmapped key is a definition
/// error rather than a runtime surprise.
pub trait BranchKey: Copy + Send + Sync + 'static {
    /// Every key this type can take.
    fn all() -> &'static [Self];

    /// Stable name used in branch tables and logs.
    fn as_str(&self) -> &'static str;
}

/// Type-erased router stored in a compiled graph.
pub(crate) type RouterFn<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

/// Declarative description of an edge, used for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeDefinition {
    /// `source` always leads to `target`.
    Static { source: String, target: String },
    /// `source` leads to the branch selected by its router.
    Conditional {
        source: String,
        /// Every key the router can produce.
        keys: Vec<String>,
        /// Branch table entries in declaration order.
        branches: Vec<(String, String)>,
    },
}

impl EdgeDefinition {
    /// Node the edge leaves from.
    pub fn source(&self) -> &str {
        match self {
            Self::Static { source, .. } | Self::Conditional { source, .. } => source,
        }
    }

    /// Every node name the edge can lead to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Static { target, .. } => vec![target.as_str()],
            Self::Conditional { branches, .. } => {
                branches.iter().map(|(_, target)| target.as_str()).collect()
            }
        }
    }
}

/// Names and edges of a graph, without node implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    /// Human-readable graph name.
    pub name: String,
    /// Registered node names in insertion order.
    pub nodes: Vec<String>,
    /// The successor of `START`.
    pub entry_point: Option<String>,
    /// All declared edges.
    pub edges: Vec<EdgeDefinition>,
}

impl GraphDefinition {
    /// Check whether a node name is registered.
    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }

    /// Get all edges leaving a given node.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&EdgeDefinition> {
        self.edges.iter().filter(|e| e.source() == node_id).collect()
    }
}

/// State captured immediately after a node completed.
///
/// Snapshots own a clone of the state; later merges never reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot<S> {
    /// ID of the run this snapshot belongs to.
    pub execution_id: String,
    /// 1-based position of the node in the run.
    pub step: u32,
    /// Name of the node that just completed.
    pub node: String,
    /// Time the node took.
    pub duration_ms: u64,
    /// Cumulative state after merging the node's update.
    pub state: S,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_targets() {
        let edge = EdgeDefinition::Conditional {
            source: "a".to_string(),
            keys: vec!["x".to_string(), "y".to_string()],
            branches: vec![
                ("x".to_string(), "b".to_string()),
                ("y".to_string(), END.to_string()),
            ],
        };
        assert_eq!(edge.source(), "a");
        assert_eq!(edge.targets(), vec!["b", END]);
    }

    #[test]
    fn test_definition_lookup() {
        let def = GraphDefinition {
            name: "g".to_string(),
            nodes: vec!["a".to_string(), "b".to_string()],
            entry_point: Some("a".to_string()),
            edges: vec![EdgeDefinition::Static {
                source: "a".to_string(),
                target: "b".to_string(),
            }],
        };
        assert!(def.has_node("b"));
        assert!(!def.has_node(END));
        assert_eq!(def.outgoing_edges("a").len(), 1);
        assert!(def.outgoing_edges("b").is_empty());
    }
}
