//! Node abstraction and a general-purpose JSON state.

use super::types::GraphState;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

/// A unit of work in a graph.
///
/// Nodes receive the cumulative state read-only and return a partial update.
/// Recoverable failures should be encoded in the update; an `Err` is treated
/// as fatal for the run.
#[async_trait]
pub trait GraphNode<S: GraphState>: Send + Sync {
    /// Execute the node against the current state.
    async fn run(&self, state: &S) -> Result<S::Update>;
}

/// Adapter turning an async closure into a [`GraphNode`].
///
/// The closure receives its own clone of the state so it can move it into
/// the returned future.
pub struct FnNode<F> {
    f: F,
}

/// Wrap an async closure as a node.
pub fn node_fn<S, F, Fut>(f: F) -> FnNode<F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Update>> + Send,
{
    FnNode { f }
}

#[async_trait]
impl<S, F, Fut> GraphNode<S> for FnNode<F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Update>> + Send,
{
    async fn run(&self, state: &S) -> Result<S::Update> {
        (self.f)(state.clone()).await
    }
}

/// String-keyed state with shallow, per-key merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonState {
    data: BTreeMap<String, Value>,
}

impl JsonState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state with initial data.
    pub fn with_data(data: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            data: data.into_iter().collect(),
        }
    }

    /// Get a value from the state.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a value in the state.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Check if a key exists in the state.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Get all data as a reference.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Get all data, consuming the state.
    pub fn into_data(self) -> BTreeMap<String, Value> {
        self.data
    }
}

/// Partial update for [`JsonState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    /// Keys to overwrite.
    pub updates: BTreeMap<String, Value>,
}

impl StateDelta {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single key update.
    pub fn with_update(mut self, key: impl Into<String>, value: Value) -> Self {
        self.updates.insert(key.into(), value);
        self
    }

    /// Add several key updates.
    pub fn with_updates(mut self, updates: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.updates.extend(updates);
        self
    }

    /// Whether the update touches no key.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

impl GraphState for JsonState {
    type Update = StateDelta;

    fn apply(&mut self, update: StateDelta) {
        for (key, value) in update.updates {
            self.data.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_overwrites_only_updated_keys() {
        let mut state = JsonState::with_data([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!({"nested": true})),
        ]);

        state.apply(StateDelta::new().with_update("a", json!(2)).with_update("c", json!("new")));

        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!({"nested": true})));
        assert_eq!(state.get("c"), Some(&json!("new")));
    }

    #[test]
    fn test_apply_is_shallow() {
        let mut state = JsonState::with_data([("obj".to_string(), json!({"x": 1, "y": 2}))]);
        state.apply(StateDelta::new().with_update("obj", json!({"x": 3})));
        // The whole value is replaced, nested keys are not merged.
        assert_eq!(state.get("obj"), Some(&json!({"x": 3})));
    }

    #[test]
    fn test_last_write_wins_across_updates() {
        let mut state = JsonState::new();
        let updates = vec![
            StateDelta::new().with_update("k", json!(1)),
            StateDelta::new().with_update("other", json!(true)),
            StateDelta::new().with_update("k", json!(3)),
        ];
        for update in updates {
            state.apply(update);
        }
        assert_eq!(state.get("k"), Some(&json!(3)));
        assert_eq!(state.get("other"), Some(&json!(true)));
        assert!(!state.contains("missing"));
    }

    #[test]
    fn test_fn_node_runs_closure() {
        let node = node_fn(|state: JsonState| async move {
            let next = state.get("n").and_then(Value::as_i64).unwrap_or(0) + 1;
            Ok(StateDelta::new().with_update("n", json!(next)))
        });
        let state = JsonState::with_data([("n".to_string(), json!(41))]);
        let update = tokio_test::block_on(node.run(&state)).unwrap();
        assert_eq!(update.updates.get("n"), Some(&json!(42)));
    }
}
