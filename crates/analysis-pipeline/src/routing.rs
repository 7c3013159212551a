//! Branch keys and routers for the pipeline's conditional edges
//!
//! Routers only read the intake and preprocess fragments. The intake flags
//! are written once and never touched downstream, so every later branch
//! sees what the user originally asked for.

use node_engine::BranchKey;

use crate::state::{NextStep, PipelineState, PreprocessStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeRoute {
    GeneralQuestion,
    DataPipeline,
}

impl BranchKey for IntakeRoute {
    fn all() -> &'static [Self] {
        &[IntakeRoute::GeneralQuestion, IntakeRoute::DataPipeline]
    }

    fn as_str(&self) -> &'static str {
        match self {
            IntakeRoute::GeneralQuestion => "general_question",
            IntakeRoute::DataPipeline => "data_pipeline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessRoute {
    Run,
    Skip,
}

impl BranchKey for PreprocessRoute {
    fn all() -> &'static [Self] {
        &[PreprocessRoute::Run, PreprocessRoute::Skip]
    }

    fn as_str(&self) -> &'static str {
        match self {
            PreprocessRoute::Run => "run_preprocess",
            PreprocessRoute::Skip => "skip_preprocess",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterRetrieval {
    Visualization,
    Report,
    DataAnswer,
}

impl BranchKey for AfterRetrieval {
    fn all() -> &'static [Self] {
        &[
            AfterRetrieval::Visualization,
            AfterRetrieval::Report,
            AfterRetrieval::DataAnswer,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            AfterRetrieval::Visualization => "visualization",
            AfterRetrieval::Report => "report",
            AfterRetrieval::DataAnswer => "data_answer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterVisualization {
    Report,
    DataAnswer,
}

impl BranchKey for AfterVisualization {
    fn all() -> &'static [Self] {
        &[AfterVisualization::Report, AfterVisualization::DataAnswer]
    }

    fn as_str(&self) -> &'static str {
        match self {
            AfterVisualization::Report => "report",
            AfterVisualization::DataAnswer => "data_answer",
        }
    }
}

/// General answer unless intake chose the data pipeline
pub fn route_after_intake(state: &PipelineState) -> IntakeRoute {
    match state.handoff().map(|h| h.next_step) {
        Some(NextStep::DataPipeline) => IntakeRoute::DataPipeline,
        _ => IntakeRoute::GeneralQuestion,
    }
}

/// Run preprocessing only on an explicit run decision
pub fn route_after_decision(state: &PipelineState) -> PreprocessRoute {
    match state.preprocess.decision.as_ref().map(|d| d.step) {
        Some(PreprocessStep::Run) => PreprocessRoute::Run,
        _ => PreprocessRoute::Skip,
    }
}

pub fn route_after_retrieval(state: &PipelineState) -> AfterRetrieval {
    match state.handoff() {
        Some(h) if h.ask_visualization => AfterRetrieval::Visualization,
        Some(h) if h.ask_report => AfterRetrieval::Report,
        _ => AfterRetrieval::DataAnswer,
    }
}

pub fn route_after_visualization(state: &PipelineState) -> AfterVisualization {
    match state.handoff() {
        Some(h) if h.ask_report => AfterVisualization::Report,
        _ => AfterVisualization::DataAnswer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Handoff, IntakeState, PreprocessDecision, StateUpdate};
    use node_engine::GraphState;

    fn with_handoff(handoff: Handoff) -> PipelineState {
        let mut state = PipelineState::default();
        state.apply(StateUpdate::new().intake(IntakeState {
            dataset_selected: Some(true),
            handoff: Some(handoff),
        }));
        state
    }

    fn data(visualization: bool, report: bool) -> Handoff {
        Handoff {
            next_step: NextStep::DataPipeline,
            ask_preprocess: false,
            ask_visualization: visualization,
            ask_report: report,
        }
    }

    #[test]
    fn test_intake_route() {
        assert_eq!(
            route_after_intake(&PipelineState::default()),
            IntakeRoute::GeneralQuestion
        );
        assert_eq!(
            route_after_intake(&with_handoff(Handoff::general())),
            IntakeRoute::GeneralQuestion
        );
        assert_eq!(
            route_after_intake(&with_handoff(data(false, false))),
            IntakeRoute::DataPipeline
        );
    }

    #[test]
    fn test_preprocess_route_defaults_to_skip() {
        let mut state = PipelineState::default();
        assert_eq!(route_after_decision(&state), PreprocessRoute::Skip);
        state.preprocess.decision = Some(PreprocessDecision {
            step: PreprocessStep::Run,
            reason: String::new(),
        });
        assert_eq!(route_after_decision(&state), PreprocessRoute::Run);
    }

    #[test]
    fn test_routes_cover_every_flag_combination() {
        for (visualization, report) in [(false, false), (false, true), (true, false), (true, true)] {
            let state = with_handoff(data(visualization, report));
            let after_retrieval = route_after_retrieval(&state);
            let after_visualization = route_after_visualization(&state);
            let expected_retrieval = if visualization {
                AfterRetrieval::Visualization
            } else if report {
                AfterRetrieval::Report
            } else {
                AfterRetrieval::DataAnswer
            };
            assert_eq!(after_retrieval, expected_retrieval);
            assert_eq!(
                after_visualization,
                if report {
                    AfterVisualization::Report
                } else {
                    AfterVisualization::DataAnswer
                }
            );
        }
    }

    #[test]
    fn test_branch_keys_are_distinct() {
        let keys: Vec<&str> = AfterRetrieval::all().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["visualization", "report", "data_answer"]);
    }
}
