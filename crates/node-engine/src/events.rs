//! Event types for observing graph execution
//!
//! Events are sent from the executor to any consumer that wants a
//! step-by-step view of a run (logging, tracing UIs, tests). They are
//! independent from the snapshot stream returned by `CompiledGraph::run`.

use serde::{Deserialize, Serialize};

/// Trait for sending workflow events
///
/// This abstracts over the transport mechanism (channel, logger, test
/// collector) so the executor does not depend on any of them.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during graph execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A run started
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow_id: String,
        execution_id: String,
    },

    /// A run reached END
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted {
        workflow_id: String,
        execution_id: String,
        steps: u32,
    },

    /// A run aborted
    #[serde(rename_all = "camelCase")]
    WorkflowFailed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        execution_id: String,
        step: u32,
    },

    /// A node completed and its update was merged
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
        step: u32,
        duration_ms: u64,
    },

    /// A node returned an unhandled error
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        execution_id: String,
        error: String,
    },
}

impl WorkflowEvent {
    /// Execution ID the event belongs to
    pub fn execution_id(&self) -> &str {
        match self {
            Self::WorkflowStarted { execution_id, .. }
            | Self::WorkflowCompleted { execution_id, .. }
            | Self::WorkflowFailed { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Forwards every event to the `log` facade at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::WorkflowFailed { error, .. } | WorkflowEvent::NodeFailed { error, .. } => {
                log::warn!("[{}] {:?}: {}", event.execution_id(), event_name(&event), error)
            }
            _ => log::debug!("[{}] {:?}", event.execution_id(), event),
        }
        Ok(())
    }
}

fn event_name(event: &WorkflowEvent) -> &'static str {
    match event {
        WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
        WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
        WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
        WorkflowEvent::NodeStarted { .. } => "node_started",
        WorkflowEvent::NodeCompleted { .. } => "node_completed",
        WorkflowEvent::NodeFailed { .. } => "node_failed",
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        let mut events = self.events.lock().map_err(|_| EventError {
            message: "event buffer poisoned".to_string(),
        })?;
        events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::NodeStarted {
            node_id: "intake".to_string(),
            execution_id: "exec1".to_string(),
            step: 1,
        })
        .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);

        match &events[0] {
            WorkflowEvent::NodeStarted { node_id, step, .. } => {
                assert_eq!(node_id, "intake");
                assert_eq!(*step, 1);
            }
            _ => panic!("Expected NodeStarted event"),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WorkflowEvent::NodeCompleted {
            node_id: "a".to_string(),
            execution_id: "e".to_string(),
            step: 2,
            duration_ms: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "nodeCompleted");
        assert_eq!(json["durationMs"], 5);
        assert_eq!(event.execution_id(), "e");
    }

    #[test]
    fn test_null_and_log_sinks_accept_events() {
        let event = WorkflowEvent::WorkflowFailed {
            workflow_id: "wf".to_string(),
            execution_id: "e".to_string(),
            error: "boom".to_string(),
        };
        NullEventSink.send(event.clone()).unwrap();
        LogEventSink.send(event).unwrap();
    }
}
