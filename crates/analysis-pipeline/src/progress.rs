//! Progress events streamed to the caller
//!
//! A run is reported as a series of thoughts (one per notable node outcome),
//! the final answer in small chunks, and a closing `done` event. A node that
//! fails fatally ends the stream with an `error` event instead.

use std::collections::HashSet;

use chart_sandbox::{ChartExecution, ExecutionStatus};
use serde::{Deserialize, Serialize};

use crate::constants::{limits, messages, nodes};
use crate::state::{
    IndexState, NextStep, PipelineState, PreprocessResult, PreprocessStatus, PreprocessStep,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStatus {
    Completed,
    Skipped,
    Failed,
}

/// One line of the run's reasoning trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThoughtStep {
    /// Pipeline phase the step belongs to
    pub phase: String,
    pub message: String,
    pub status: ThoughtStatus,
}

impl ThoughtStep {
    fn new(phase: &str, message: impl Into<String>, status: ThoughtStatus) -> Self {
        Self {
            phase: phase.to_string(),
            message: message.into(),
            status,
        }
    }

    fn completed(phase: &str, message: impl Into<String>) -> Self {
        Self::new(phase, message, ThoughtStatus::Completed)
    }
}

/// Events emitted while a question is being answered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A node finished with something worth reporting
    Thought(ThoughtStep),

    /// A piece of the final answer
    Chunk {
        delta: String,
    },

    /// The run finished
    #[serde(rename_all = "camelCase")]
    Done {
        /// Complete answer text
        answer: String,
        /// Every thought emitted during the run, in order
        thought_steps: Vec<ThoughtStep>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preprocess_result: Option<PreprocessResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visualization_result: Option<ChartExecution>,
    },

    /// A node failed in a way the run could not recover from
    Error {
        /// Node that failed, when known
        node: String,
        message: String,
    },
}

impl ProgressEvent {
    /// Terminal event for a finished run
    pub fn done(state: &PipelineState, thought_steps: Vec<ThoughtStep>) -> Self {
        ProgressEvent::Done {
            answer: state
                .output
                .answer
                .as_ref()
                .map(|a| a.content.clone())
                .unwrap_or_default(),
            thought_steps,
            preprocess_result: state.preprocess.result.clone(),
            visualization_result: state.visualization.result.clone(),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Thought describing what `node` just did, judged from the merged state
pub fn describe(node: &str, state: &PipelineState) -> Option<ThoughtStep> {
    let step = match node {
        nodes::INTAKE => {
            let handoff = state.handoff()?;
            match handoff.next_step {
                NextStep::GeneralQuestion => {
                    ThoughtStep::completed("intake", "Treating this as a general question.")
                }
                NextStep::DataPipeline => ThoughtStep::completed(
                    "intake",
                    format!(
                        "Routing to the data pipeline (preprocess: {}, chart: {}, report: {}).",
                        yes_no(handoff.ask_preprocess),
                        yes_no(handoff.ask_visualization),
                        yes_no(handoff.ask_report)
                    ),
                ),
            }
        }
        nodes::DATASET_PROFILE => {
            let profile = state.preprocess.profile.as_ref()?;
            if profile.available {
                ThoughtStep::completed(
                    "profile",
                    format!(
                        "Profiled {} sample rows across {} columns.",
                        profile.sample_rows,
                        profile.columns.len()
                    ),
                )
            } else {
                ThoughtStep::new(
                    "profile",
                    "The dataset could not be profiled.",
                    ThoughtStatus::Skipped,
                )
            }
        }
        nodes::PREPROCESS_DECISION => {
            let decision = state.preprocess.decision.as_ref()?;
            let verb = match decision.step {
                PreprocessStep::Run => "Preprocessing will run",
                PreprocessStep::Skip => "Preprocessing is not needed",
            };
            ThoughtStep::completed("preprocess", format!("{}: {}", verb, decision.reason))
        }
        nodes::PREPROCESS_PLANNER => {
            let plan = state.preprocess.plan.as_ref()?;
            match &plan.error {
                Some(error) => ThoughtStep::new(
                    "preprocess",
                    format!("Could not plan preprocessing: {}", error),
                    ThoughtStatus::Failed,
                ),
                None => ThoughtStep::completed(
                    "preprocess",
                    format!("Planned {} preprocessing operations.", plan.operations.len()),
                ),
            }
        }
        nodes::PREPROCESS_EXECUTOR | nodes::PREPROCESS_SKIP => {
            let result = state.preprocess.result.as_ref()?;
            match result.status {
                PreprocessStatus::Applied => ThoughtStep::completed(
                    "preprocess",
                    format!(
                        "Applied {} operations and saved a new copy as '{}'.",
                        result.applied_ops_count,
                        result.output_source_id.as_deref().unwrap_or_default()
                    ),
                ),
                PreprocessStatus::Skipped => ThoughtStep::new(
                    "preprocess",
                    "Preprocessing was skipped.",
                    ThoughtStatus::Skipped,
                ),
                PreprocessStatus::Failed => ThoughtStep::new(
                    "preprocess",
                    format!(
                        "Preprocessing failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                    ThoughtStatus::Failed,
                ),
            }
        }
        nodes::RAG_INDEX => {
            let status = state.retrieval.index_status.as_ref()?;
            let source = status.source_id.as_deref().unwrap_or_default();
            match status.status {
                IndexState::NoSource => ThoughtStep::new(
                    "retrieval",
                    "No dataset to index.",
                    ThoughtStatus::Skipped,
                ),
                IndexState::DatasetMissing => ThoughtStep::new(
                    "retrieval",
                    format!("Dataset '{}' is not registered.", source),
                    ThoughtStatus::Failed,
                ),
                IndexState::Existing => ThoughtStep::completed(
                    "retrieval",
                    format!("Using the existing index for '{}'.", source),
                ),
                IndexState::Created => {
                    ThoughtStep::completed("retrieval", format!("Indexed '{}'.", source))
                }
                IndexState::Failed => ThoughtStep::new(
                    "retrieval",
                    format!(
                        "Indexing '{}' failed: {}",
                        source,
                        status.error.as_deref().unwrap_or("unknown error")
                    ),
                    ThoughtStatus::Failed,
                ),
            }
        }
        nodes::RAG_RETRIEVE => {
            let result = state.retrieval.result.as_ref()?;
            match &result.error {
                Some(error) => ThoughtStep::new(
                    "retrieval",
                    format!("Search failed: {}", error),
                    ThoughtStatus::Failed,
                ),
                None => ThoughtStep::completed(
                    "retrieval",
                    format!("Retrieved {} related passages.", result.count),
                ),
            }
        }
        nodes::INSIGHT_SYNTHESIS => {
            let insight = state.retrieval.insight.as_ref()?;
            if insight.retrieved_count == 0 {
                ThoughtStep::new("insight", messages::NO_EVIDENCE, ThoughtStatus::Skipped)
            } else {
                ThoughtStep::completed(
                    "insight",
                    format!(
                        "Summarized evidence from {} passages.",
                        insight.retrieved_count
                    ),
                )
            }
        }
        nodes::VISUALIZATION_PLANNER => {
            let plan = state.visualization.plan.as_ref()?;
            match plan.chart_type.filter(|_| plan.is_planned()) {
                Some(chart_type) => ThoughtStep::completed(
                    "visualization",
                    format!("Planned a {} chart.", chart_type),
                ),
                None => ThoughtStep::new("visualization", &plan.reason, ThoughtStatus::Skipped),
            }
        }
        nodes::VISUALIZATION_EXECUTOR => {
            let result = state.visualization.result.as_ref()?;
            let status = match result.status {
                ExecutionStatus::Generated => ThoughtStatus::Completed,
                ExecutionStatus::Unavailable => ThoughtStatus::Failed,
            };
            ThoughtStep::new("visualization", &result.summary, status)
        }
        nodes::REPORT_COMPOSER => ThoughtStep::completed("report", "Composed the report."),
        nodes::GENERAL_ANSWER | nodes::DATA_ANSWER => {
            ThoughtStep::completed("answer", "Composed the answer.")
        }
        _ => return None,
    };
    Some(step)
}

/// Collects thoughts for one run, dropping repeats of the same phase and message
#[derive(Debug, Default)]
pub struct ThoughtTracker {
    seen: HashSet<(String, String)>,
    steps: Vec<ThoughtStep>,
}

impl ThoughtTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the thought for a completed node; `None` when there is
    /// nothing new to report
    pub fn observe(&mut self, node: &str, state: &PipelineState) -> Option<ThoughtStep> {
        let step = describe(node, state)?;
        if !self
            .seen
            .insert((step.phase.clone(), step.message.clone()))
        {
            return None;
        }
        self.steps.push(step.clone());
        Some(step)
    }

    pub fn steps(&self) -> &[ThoughtStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<ThoughtStep> {
        self.steps
    }
}

/// Split an answer into chunks of at most `ANSWER_CHUNK_CHARS` characters
pub fn answer_chunks(answer: &str) -> Vec<String> {
    let chars: Vec<char> = answer.chars().collect();
    chars
        .chunks(limits::ANSWER_CHUNK_CHARS)
        .map(|c| c.iter().collect())
        .collect()
}
