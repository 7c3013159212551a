//! Fluent builder for executable graphs
//!
//! Collects nodes, edges and branch tables, then validates the whole
//! definition in `compile`. Nothing is checked while building.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{NodeEngineError, Result};
use crate::events::{EventSink, NullEventSink};
use crate::orchestration::executor::{CompiledGraph, GraphInner, Transition};
use crate::orchestration::nodes::GraphNode;
use crate::orchestration::types::{BranchKey, EdgeDefinition, GraphDefinition, GraphState, START};
use crate::validation::validate_graph;

/// Default step limit for a single run.
pub const DEFAULT_MAX_STEPS: u32 = 1000;

/// Fluent builder for constructing graphs over a state type `S`
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("greeting")
///     .add_node("hello", node_fn(|_s: JsonState| async { Ok(StateDelta::new()) }))
///     .add_edge(START, "hello")
///     .add_edge("hello", END)
///     .compile()?;
/// ```
pub struct GraphBuilder<S: GraphState> {
    name: String,
    nodes: Vec<(String, Arc<dyn GraphNode<S>>)>,
    edges: Vec<EdgeDefinition>,
    transitions: Vec<(String, Transition<S>)>,
    entry_point: Option<String>,
    max_steps: u32,
    event_sink: Arc<dyn EventSink>,
}

impl<S: GraphState> GraphBuilder<S> {
    /// Create a new empty builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            transitions: Vec::new(),
            entry_point: None,
            max_steps: DEFAULT_MAX_STEPS,
            event_sink: Arc::new(NullEventSink),
        }
    }

    /// Register a node under a name
    pub fn add_node(mut self, name: impl Into<String>, node: impl GraphNode<S> + 'static) -> Self {
        self.nodes.push((name.into(), Arc::new(node)));
        self
    }

    /// Register an already shared node
    pub fn add_shared_node(mut self, name: impl Into<String>, node: Arc<dyn GraphNode<S>>) -> Self {
        self.nodes.push((name.into(), node));
        self
    }

    /// Add a static edge. An edge from `START` sets the entry point.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.entry_point = Some(to);
            return self;
        }
        self.edges.push(EdgeDefinition::Static {
            source: from.clone(),
            target: to.clone(),
        });
        self.transitions.push((from, Transition::Static(to)));
        self
    }

    /// Add a conditional edge
    ///
    /// After `from` completes, `router` is called with the merged state and
    /// its key is looked up in `table`. Every value of `K` must be mapped.
    pub fn add_conditional_edges<K, R, T>(
        mut self,
        from: impl Into<String>,
        router: R,
        table: impl IntoIterator<Item = (K, T)>,
    ) -> Self
    where
        K: BranchKey,
        R: Fn(&S) -> K + Send + Sync + 'static,
        T: Into<String>,
    {
        let from = from.into();
        let branches: Vec<(String, String)> = table
            .into_iter()
            .map(|(key, target)| (key.as_str().to_string(), target.into()))
            .collect();

        let mut lookup: HashMap<String, String> = HashMap::new();
        for (key, target) in &branches {
            lookup.insert(key.clone(), target.clone());
        }

        self.edges.push(EdgeDefinition::Conditional {
            source: from.clone(),
            keys: K::all().iter().map(|k| k.as_str().to_string()).collect(),
            branches,
        });
        self.transitions.push((
            from,
            Transition::Conditional {
                router: Arc::new(move |state: &S| router(state).as_str()),
                branches: lookup,
            },
        ));
        self
    }

    /// Set the node that runs first
    pub fn set_entry_point(mut self, node: impl Into<String>) -> Self {
        self.entry_point = Some(node.into());
        self
    }

    /// Set the maximum number of node executions per run
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the sink receiving execution events
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Declarative view of what has been built so far
    pub fn definition(&self) -> GraphDefinition {
        GraphDefinition {
            name: self.name.clone(),
            nodes: self.nodes.iter().map(|(name, _)| name.clone()).collect(),
            entry_point: self.entry_point.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Validate the definition and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let definition = self.definition();
        let errors = validate_graph(&definition);
        if !errors.is_empty() {
            return Err(NodeEngineError::Definition(errors));
        }

        let entry = definition
            .entry_point
            .clone()
            .ok_or_else(|| NodeEngineError::failed("entry point vanished after validation"))?;

        log::debug!(
            "Compiled graph '{}' with {} nodes and {} edges",
            definition.name,
            definition.nodes.len(),
            definition.edges.len()
        );

        Ok(CompiledGraph::from_inner(GraphInner {
            definition,
            entry,
            nodes: self.nodes.into_iter().collect(),
            transitions: self.transitions.into_iter().collect(),
            max_steps: self.max_steps,
            event_sink: self.event_sink,
        }))
    }
}
