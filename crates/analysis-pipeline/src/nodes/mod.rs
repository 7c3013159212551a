//! Pipeline nodes
//!
//! Every node is an async function `(context, state) -> StateUpdate`. Nodes
//! reach models, files and indices only through [`PipelineContext`], and
//! degrade into state instead of failing wherever a partial answer is still
//! possible.

pub mod answer;
pub mod intake;
pub mod preprocess;
pub mod rag;
pub mod visualization;

use std::path::PathBuf;
use std::sync::Arc;

use capabilities::{
    CompletionRequest, CsvSampleReader, DatasetRecord, DatasetRegistry, ReadTabularSample,
    StructuredCompletion, TextCompletion,
};
use chart_sandbox::{ChartPlanner, SandboxExecutor};
use retrieval::RetrievalService;

use crate::constants::limits;
use crate::state::PipelineState;

/// Collaborators shared by every run
pub struct PipelineContext {
    pub text: Arc<dyn TextCompletion>,
    pub structured: Arc<dyn StructuredCompletion>,
    pub registry: Arc<dyn DatasetRegistry>,
    pub reader: Arc<dyn ReadTabularSample>,
    pub retrieval: Arc<RetrievalService>,
    pub planner: ChartPlanner,
    pub sandbox: Arc<SandboxExecutor>,
    /// Where preprocessed dataset copies are written
    pub preprocessed_dir: PathBuf,
    pub top_k: usize,
    /// Rows sampled for chart planning and revalidation
    pub chart_sample_rows: usize,
    pub preprocess_max_rows: usize,
}

impl PipelineContext {
    pub fn new(
        text: Arc<dyn TextCompletion>,
        structured: Arc<dyn StructuredCompletion>,
        registry: Arc<dyn DatasetRegistry>,
        retrieval: Arc<RetrievalService>,
        preprocessed_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            text,
            structured,
            registry,
            reader: Arc::new(CsvSampleReader::new()),
            retrieval,
            planner: ChartPlanner::new(),
            sandbox: Arc::new(SandboxExecutor::new()),
            preprocessed_dir: preprocessed_dir.into(),
            top_k: limits::RETRIEVAL_TOP_K,
            chart_sample_rows: chart_sandbox::defaults::MAX_SAMPLE_ROWS,
            preprocess_max_rows: limits::PREPROCESS_MAX_ROWS,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn ReadTabularSample>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_planner(mut self, planner: ChartPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<SandboxExecutor>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_chart_sample_rows(mut self, rows: usize) -> Self {
        self.chart_sample_rows = rows;
        self
    }

    pub fn with_preprocess_max_rows(mut self, rows: usize) -> Self {
        self.preprocess_max_rows = rows;
        self
    }
}

/// Outcome of resolving a dataset id
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    /// No dataset id in play
    None,
    /// An id that the registry does not know
    Missing(String),
    Found(DatasetRecord),
}

async fn lookup(ctx: &PipelineContext, id: &str) -> Target {
    match ctx.registry.resolve(id).await {
        Ok(Some(record)) => Target::Found(record),
        Ok(None) => Target::Missing(id.to_string()),
        Err(e) => {
            log::warn!("Dataset lookup for '{}' failed: {}", id, e);
            Target::Missing(id.to_string())
        }
    }
}

/// Dataset the data stages operate on (see [`PipelineState::target_source_id`])
pub(crate) async fn resolve_target(ctx: &PipelineContext, state: &PipelineState) -> Target {
    if let Some((source_id, path)) = state.preprocessed_output() {
        return Target::Found(DatasetRecord {
            dataset_id: source_id.clone(),
            source_id,
            storage_path: path,
        });
    }
    match state.target_source_id() {
        Some(id) => lookup(ctx, &id).await,
        None => Target::None,
    }
}

/// Dataset selected in the request, ignoring later stages
pub(crate) async fn resolve_selected(ctx: &PipelineContext, state: &PipelineState) -> Target {
    match state.request.dataset_lookup_id() {
        Some(id) => lookup(ctx, id).await,
        None => Target::None,
    }
}

/// Completion request carrying the caller's model choice
pub(crate) fn completion(
    state: &PipelineState,
    system: &str,
    prompt: impl Into<String>,
) -> CompletionRequest {
    CompletionRequest::new(prompt)
        .with_system(system)
        .with_model(state.request.model_id.clone())
}

/// Low-temperature request for classification and planning calls
pub(crate) fn decision_request(
    state: &PipelineState,
    system: &str,
    prompt: impl Into<String>,
) -> CompletionRequest {
    completion(state, system, prompt).with_temperature(0.0)
}
