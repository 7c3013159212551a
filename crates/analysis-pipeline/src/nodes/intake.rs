//! Intake classification and the general-question terminal

use std::sync::Arc;

use capabilities::{complete_structured, JsonSchema, StructuredOutput};
use chart_sandbox::detect_requested_chart_type;
use node_engine::NodeEngineError;
use serde::Deserialize;
use serde_json::json;

use super::{completion, decision_request, PipelineContext};
use crate::state::{Handoff, IntakeState, NextStep, OutputKind, PipelineState, StateUpdate};

const INTENT_SYSTEM: &str = "Classify the user's intent. Return data_pipeline when answering \
requires the selected dataset, otherwise general_question. Set ask_preprocess when the user asks \
to clean or transform data, ask_visualization when a chart is wanted, and ask_report when a \
written report is wanted.";

const GENERAL_SYSTEM: &str = "Answer the user's question concisely and accurately.";

const PREPROCESS_KEYWORDS: &[&str] = &[
    "preprocess", "clean", "impute", "normalize", "standardize", "전처리", "결측", "정제",
];
const VISUALIZATION_KEYWORDS: &[&str] = &[
    "chart", "plot", "graph", "visual", "시각화", "그래프", "차트",
];
const REPORT_KEYWORDS: &[&str] = &["report", "리포트", "보고서"];

#[derive(Debug, Deserialize)]
struct IntentDecision {
    step: NextStep,
    #[serde(default)]
    ask_preprocess: bool,
    #[serde(default)]
    ask_visualization: bool,
    #[serde(default)]
    ask_report: bool,
}

impl StructuredOutput for IntentDecision {
    fn schema() -> JsonSchema {
        JsonSchema::new(
            "intent_decision",
            json!({
                "type": "object",
                "properties": {
                    "step": {"type": "string", "enum": ["general_question", "data_pipeline"]},
                    "ask_preprocess": {"type": "boolean"},
                    "ask_visualization": {"type": "boolean"},
                    "ask_report": {"type": "boolean"}
                },
                "required": ["step", "ask_preprocess", "ask_visualization", "ask_report"],
                "additionalProperties": false
            }),
        )
    }
}

fn mentions(question: &str, keywords: &[&str]) -> bool {
    let lowered = question.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

/// Keyword fallback used when the classifier is unavailable
pub fn heuristic_handoff(question: &str) -> Handoff {
    Handoff {
        next_step: NextStep::DataPipeline,
        ask_preprocess: mentions(question, PREPROCESS_KEYWORDS),
        ask_visualization: mentions(question, VISUALIZATION_KEYWORDS)
            || detect_requested_chart_type(question).is_some(),
        ask_report: mentions(question, REPORT_KEYWORDS),
    }
}

/// Decide between the general answer and the data pipeline
pub async fn intake(ctx: Arc<PipelineContext>, state: PipelineState) -> node_engine::Result<StateUpdate> {
    let question = state.request.question.trim();
    let dataset_selected = state.request.dataset_lookup_id().is_some();

    let handoff = if !dataset_selected {
        Handoff::general()
    } else {
        let request = decision_request(&state, INTENT_SYSTEM, question);
        match complete_structured::<IntentDecision>(ctx.structured.as_ref(), &request).await {
            Ok(decision) if decision.step == NextStep::GeneralQuestion => Handoff::general(),
            Ok(decision) => Handoff {
                next_step: NextStep::DataPipeline,
                ask_preprocess: decision.ask_preprocess,
                ask_visualization: decision.ask_visualization,
                ask_report: decision.ask_report,
            },
            Err(e) => {
                log::warn!("Intent classification failed, using keywords: {}", e);
                heuristic_handoff(question)
            }
        }
    };

    log::info!(
        "Intake: {:?} (preprocess={}, visualization={}, report={})",
        handoff.next_step,
        handoff.ask_preprocess,
        handoff.ask_visualization,
        handoff.ask_report
    );

    Ok(StateUpdate::new().intake(IntakeState {
        dataset_selected: Some(dataset_selected),
        handoff: Some(handoff),
    }))
}

/// Answer without any dataset work
///
/// There is nothing to fall back to here, so a completion failure is fatal.
pub async fn general_answer(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let request = completion(&state, GENERAL_SYSTEM, state.request.question.trim());
    let answer = ctx
        .text
        .complete(&request)
        .await
        .map_err(|e| NodeEngineError::failed(format!("General answer failed: {}", e)))?;
    Ok(StateUpdate::new().answer(OutputKind::GeneralQuestion, answer.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_flags() {
        let handoff = heuristic_handoff("Clean the data and draw a scatter plot");
        assert_eq!(handoff.next_step, NextStep::DataPipeline);
        assert!(handoff.ask_preprocess);
        assert!(handoff.ask_visualization);
        assert!(!handoff.ask_report);

        let handoff = heuristic_handoff("매출 히스토그램과 보고서를 만들어줘");
        assert!(handoff.ask_visualization);
        assert!(handoff.ask_report);
        assert!(!handoff.ask_preprocess);
    }

    #[test]
    fn test_intent_decision_defaults_flags() {
        let decision: IntentDecision =
            serde_json::from_value(json!({"step": "data_pipeline"})).unwrap();
        assert_eq!(decision.step, NextStep::DataPipeline);
        assert!(!decision.ask_report);
    }
}
