//! Pipeline state envelope
//!
//! The state is a set of named fragments, each owned by one stage. Every
//! fragment field is a merge key: a [`StateUpdate`] carries optional
//! fragments whose `Some` fields overwrite the same field of the state and
//! leave everything else alone. The request context is set when a run
//! starts and never updated.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chart_sandbox::{ChartArtifact, ChartExecution, ChartSpec, VisualizationPlan};
use node_engine::GraphState;
use retrieval::RetrievedChunk;
use serde::{Deserialize, Serialize};

use crate::metrics::ReportMetrics;
use crate::transform::PreprocessOperation;

/// What the caller asked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub session_id: String,
    pub question: String,
    pub dataset_id: Option<String>,
    pub source_id: Option<String>,
    pub model_id: Option<String>,
}

impl RequestContext {
    /// Id used to look the selected dataset up: the source id, else the dataset id
    pub fn dataset_lookup_id(&self) -> Option<&str> {
        non_blank(self.source_id.as_deref()).or_else(|| non_blank(self.dataset_id.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Coarse destination chosen at intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    GeneralQuestion,
    DataPipeline,
}

/// Intake decision threaded to every later routing point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub next_step: NextStep,
    pub ask_preprocess: bool,
    pub ask_visualization: bool,
    pub ask_report: bool,
}

impl Handoff {
    pub fn general() -> Self {
        Self {
            next_step: NextStep::GeneralQuestion,
            ask_preprocess: false,
            ask_visualization: false,
            ask_report: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeState {
    pub dataset_selected: Option<bool>,
    pub handoff: Option<Handoff>,
}

/// Sample-based description of the selected dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub available: bool,
    pub source_id: Option<String>,
    pub sample_rows: usize,
    pub columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub temporal_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub missing_ratio_by_column: BTreeMap<String, f64>,
}

impl DatasetProfile {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStep {
    Run,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessDecision {
    pub step: PreprocessStep,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessPlan {
    pub operations: Vec<PreprocessOperation>,
    /// Set when the plan could not be produced
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStatus {
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessResult {
    pub status: PreprocessStatus,
    pub applied_ops_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Rows in the written copy
    #[serde(default)]
    pub rows_written: usize,
    /// The source had more rows than the preprocessing limit
    #[serde(default)]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreprocessResult {
    pub fn skipped() -> Self {
        Self {
            status: PreprocessStatus::Skipped,
            applied_ops_count: 0,
            output_source_id: None,
            output_path: None,
            rows_written: 0,
            truncated: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PreprocessStatus::Failed,
            error: Some(error.into()),
            ..Self::skipped()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessState {
    pub profile: Option<DatasetProfile>,
    pub decision: Option<PreprocessDecision>,
    pub plan: Option<PreprocessPlan>,
    pub result: Option<PreprocessResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing to index: no dataset was selected
    NoSource,
    /// The selected id is not in the dataset registry
    DatasetMissing,
    /// An index for the current file content already existed
    Existing,
    Created,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub status: IndexState,
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexStatus {
    pub fn new(status: IndexState, source_id: Option<String>) -> Self {
        Self {
            status,
            source_id,
            error: None,
        }
    }

    pub fn is_searchable(&self) -> bool {
        matches!(self.status, IndexState::Existing | IndexState::Created)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub source_id: Option<String>,
    pub chunks: Vec<RetrievedChunk>,
    pub context: String,
    pub count: usize,
    pub data_exists: bool,
    /// Set when the search itself failed; the run continues without context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub summary: String,
    pub evidence_summary: String,
    pub retrieved_count: usize,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalState {
    pub index_status: Option<IndexStatus>,
    pub result: Option<RetrievalResult>,
    pub insight: Option<Insight>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationState {
    pub plan: Option<VisualizationPlan>,
    pub result: Option<ChartExecution>,
}

/// A chart included in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportVisualization {
    pub chart: ChartSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ChartArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub summary: String,
    pub metrics: ReportMetrics,
    pub visualizations: Vec<ReportVisualization>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportState {
    pub result: Option<ReportResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    GeneralQuestion,
    DataAnswer,
    ReportAnswer,
}

/// The final answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub kind: OutputKind,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputState {
    pub answer: Option<PipelineOutput>,
}

/// Overwrite every field of `target` whose counterpart in `update` is `Some`
macro_rules! merge_fields {
    ($target:expr, $update:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if let Some(value) = $update.$field {
                $target.$field = Some(value);
            }
        )+
    };
}

/// Accumulated state of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub request: RequestContext,
    pub intake: IntakeState,
    pub preprocess: PreprocessState,
    pub retrieval: RetrievalState,
    pub visualization: VisualizationState,
    pub report: ReportState,
    pub output: OutputState,
}

impl PipelineState {
    pub fn new(request: RequestContext) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }

    pub fn handoff(&self) -> Option<&Handoff> {
        self.intake.handoff.as_ref()
    }

    /// Source the data stages work on
    ///
    /// An applied preprocessing output wins, then the retrieval result's
    /// source, then the dataset selected in the request.
    pub fn target_source_id(&self) -> Option<String> {
        if let Some(result) = &self.preprocess.result {
            if result.status == PreprocessStatus::Applied {
                if let Some(id) = non_blank(result.output_source_id.as_deref()) {
                    return Some(id.to_string());
                }
            }
        }
        if let Some(id) = self
            .retrieval
            .result
            .as_ref()
            .and_then(|r| non_blank(r.source_id.as_deref()))
        {
            return Some(id.to_string());
        }
        self.request.dataset_lookup_id().map(str::to_string)
    }

    /// Preprocessed file to use instead of a registry lookup, if any
    pub fn preprocessed_output(&self) -> Option<(String, PathBuf)> {
        let result = self.preprocess.result.as_ref()?;
        if result.status != PreprocessStatus::Applied {
            return None;
        }
        Some((result.output_source_id.clone()?, result.output_path.clone()?))
    }
}

/// Partial update returned by a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub intake: Option<IntakeState>,
    pub preprocess: Option<PreprocessState>,
    pub retrieval: Option<RetrievalState>,
    pub visualization: Option<VisualizationState>,
    pub report: Option<ReportState>,
    pub output: Option<OutputState>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intake(mut self, intake: IntakeState) -> Self {
        self.intake = Some(intake);
        self
    }

    pub fn preprocess(mut self, preprocess: PreprocessState) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalState) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn visualization(mut self, visualization: VisualizationState) -> Self {
        self.visualization = Some(visualization);
        self
    }

    pub fn report(mut self, report: ReportState) -> Self {
        self.report = Some(report);
        self
    }

    /// Set the final answer
    pub fn answer(mut self, kind: OutputKind, content: impl Into<String>) -> Self {
        self.output = Some(OutputState {
            answer: Some(PipelineOutput {
                kind,
                content: content.into(),
            }),
        });
        self
    }
}

impl GraphState for PipelineState {
    type Update = StateUpdate;

    fn apply(&mut self, update: StateUpdate) {
        if let Some(intake) = update.intake {
            merge_fields!(self.intake, intake, [dataset_selected, handoff]);
        }
        if let Some(preprocess) = update.preprocess {
            merge_fields!(self.preprocess, preprocess, [profile, decision, plan, result]);
        }
        if let Some(retrieval) = update.retrieval {
            merge_fields!(self.retrieval, retrieval, [index_status, result, insight]);
        }
        if let Some(visualization) = update.visualization {
            merge_fields!(self.visualization, visualization, [plan, result]);
        }
        if let Some(report) = update.report {
            merge_fields!(self.report, report, [result]);
        }
        if let Some(output) = update.output {
            merge_fields!(self.output, output, [answer]);
        }
    }
}
