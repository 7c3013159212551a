//! Graph definition validation
//!
//! Checks entry point, node references, branch tables, per-node edge
//! cardinality and reachability from the entry point. All problems are
//! collected, not just the first one.

use std::collections::{HashSet, VecDeque};

use crate::orchestration::types::{EdgeDefinition, GraphDefinition, END, START};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No node was designated as the successor of START
    MissingEntryPoint,
    /// The entry point is not a registered node
    UnknownEntryPoint { node_id: String },
    /// Two nodes share a name
    DuplicateNode { node_id: String },
    /// A node uses a sentinel name
    ReservedNodeName { node_id: String },
    /// A static edge references a non-existent node
    UnknownNode { edge: String, node_id: String },
    /// A branch table entry targets a non-existent node
    UnknownBranchTarget {
        node_id: String,
        key: String,
        target: String,
    },
    /// A key the router can produce has no branch table entry
    UnmappedBranchKey { node_id: String, key: String },
    /// A branch table entry uses a key the router never produces
    UnknownBranchKey { node_id: String, key: String },
    /// A node has no outgoing edge
    MissingOutgoingEdge { node_id: String },
    /// A node has more than one outgoing edge definition
    MultipleOutgoingEdges { node_id: String },
    /// No path leads from the entry point to the node
    Unreachable { node_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEntryPoint => write!(f, "Graph has no entry point"),
            Self::UnknownEntryPoint { node_id } => {
                write!(f, "Entry point '{}' is not a registered node", node_id)
            }
            Self::DuplicateNode { node_id } => {
                write!(f, "Node '{}' is registered more than once", node_id)
            }
            Self::ReservedNodeName { node_id } => {
                write!(f, "Node name '{}' is reserved", node_id)
            }
            Self::UnknownNode { edge, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge, node_id)
            }
            Self::UnknownBranchTarget {
                node_id,
                key,
                target,
            } => {
                write!(
                    f,
                    "Branch '{}' of node '{}' targets unknown node '{}'",
                    key, node_id, target
                )
            }
            Self::UnmappedBranchKey { node_id, key } => {
                write!(f, "Branch '{}' of node '{}' has no target", key, node_id)
            }
            Self::UnknownBranchKey { node_id, key } => {
                write!(
                    f,
                    "Branch table of node '{}' maps '{}' which its router never returns",
                    node_id, key
                )
            }
            Self::MissingOutgoingEdge { node_id } => {
                write!(f, "Node '{}' has no outgoing edge", node_id)
            }
            Self::MultipleOutgoingEdges { node_id } => {
                write!(f, "Node '{}' has more than one outgoing edge", node_id)
            }
            Self::Unreachable { node_id } => {
                write!(f, "Node '{}' cannot be reached from the entry point", node_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a graph definition
///
/// Returns all validation errors found (not just the first).
pub fn validate_graph(graph: &GraphDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_node_names(graph, &mut errors);
    validate_entry_point(graph, &mut errors);
    validate_edge_references(graph, &mut errors);
    validate_branch_tables(graph, &mut errors);
    validate_outgoing_edges(graph, &mut errors);
    validate_reachability(graph, &mut errors);

    errors
}

/// Check for duplicate and reserved node names
fn validate_node_names(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node_id in &graph.nodes {
        if node_id == START || node_id == END {
            errors.push(ValidationError::ReservedNodeName {
                node_id: node_id.clone(),
            });
        }
        if !seen.insert(node_id.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node_id.clone(),
            });
        }
    }
}

fn validate_entry_point(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    match &graph.entry_point {
        None => errors.push(ValidationError::MissingEntryPoint),
        Some(entry) if !graph.has_node(entry) => {
            errors.push(ValidationError::UnknownEntryPoint {
                node_id: entry.clone(),
            });
        }
        Some(_) => {}
    }
}

/// Check that static edge sources and targets exist (targets may be END)
fn validate_edge_references(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    for edge in &graph.edges {
        let source = edge.source();
        if let EdgeDefinition::Static { target, .. } = edge {
            let label = format!("{} -> {}", source, target);
            if !graph.has_node(source) {
                errors.push(ValidationError::UnknownNode {
                    edge: label.clone(),
                    node_id: source.to_string(),
                });
            }
            if target != END && !graph.has_node(target) {
                errors.push(ValidationError::UnknownNode {
                    edge: label,
                    node_id: target.clone(),
                });
            }
        } else if !graph.has_node(source) {
            errors.push(ValidationError::UnknownNode {
                edge: format!("{} -> ?", source),
                node_id: source.to_string(),
            });
        }
    }
}

/// Check branch table completeness and targets
fn validate_branch_tables(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    for edge in &graph.edges {
        let EdgeDefinition::Conditional {
            source,
            keys,
            branches,
        } = edge
        else {
            continue;
        };

        for (key, target) in branches {
            if !keys.contains(key) {
                errors.push(ValidationError::UnknownBranchKey {
                    node_id: source.clone(),
                    key: key.clone(),
                });
            }
            if target != END && !graph.has_node(target) {
                errors.push(ValidationError::UnknownBranchTarget {
                    node_id: source.clone(),
                    key: key.clone(),
                    target: target.clone(),
                });
            }
        }

        for key in keys {
            if !branches.iter().any(|(mapped, _)| mapped == key) {
                errors.push(ValidationError::UnmappedBranchKey {
                    node_id: source.clone(),
                    key: key.clone(),
                });
            }
        }
    }
}

/// Every node needs exactly one outgoing edge definition
fn validate_outgoing_edges(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    for node_id in &graph.nodes {
        match graph.outgoing_edges(node_id).len() {
            0 => errors.push(ValidationError::MissingOutgoingEdge {
                node_id: node_id.clone(),
            }),
            1 => {}
            _ => errors.push(ValidationError::MultipleOutgoingEdges {
                node_id: node_id.clone(),
            }),
        }
    }
}

/// Breadth-first walk from the entry point over every edge target.
/// Skipped when the entry point itself is missing or unknown.
fn validate_reachability(graph: &GraphDefinition, errors: &mut Vec<ValidationError>) {
    let Some(entry) = graph.entry_point.as_deref() else {
        return;
    };
    if !graph.has_node(entry) {
        return;
    }

    let mut reached = HashSet::from([entry]);
    let mut queue = VecDeque::from([entry]);
    while let Some(node_id) = queue.pop_front() {
        for edge in graph.outgoing_edges(node_id) {
            for target in edge.targets() {
                if target != END && reached.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }

    for node_id in &graph.nodes {
        if !reached.contains(node_id.as_str()) {
            errors.push(ValidationError::Unreachable {
                node_id: node_id.clone(),
            });
        }
    }
}
