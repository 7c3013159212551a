//! Question-answering entry point
//!
//! [`AnalysisAssistant`] owns one compiled graph and turns each question into
//! a stream of [`ProgressEvent`]s. Runs share nothing mutable, so one
//! assistant serves any number of concurrent questions.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use capabilities::{
    Embedder, InMemoryDatasetRegistry, OpenAiCompatibleClient, PrefixedEmbedder,
};
use chart_sandbox::{ChartPlanner, SandboxExecutor};
use futures_util::{Stream, StreamExt};
use node_engine::{CompiledGraph, NodeEngineError};
use retrieval::{ChunkConfig, RetrievalService};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::constants::messages;
use crate::error::Result;
use crate::graph::build_pipeline_graph;
use crate::nodes::PipelineContext;
use crate::progress::{answer_chunks, ProgressEvent, ThoughtTracker};
use crate::state::{PipelineState, RequestContext};

/// Stream of progress events for one question
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// A question plus the dataset and model it concerns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    /// Chat model override for this question
    #[serde(default)]
    pub model_id: Option<String>,
}

impl InvokeRequest {
    pub fn new(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    fn into_context(self) -> RequestContext {
        RequestContext {
            session_id: self.session_id,
            question: self.question,
            dataset_id: self.dataset_id,
            source_id: self.source_id,
            model_id: self.model_id,
        }
    }
}

pub struct AnalysisAssistant {
    graph: CompiledGraph<PipelineState>,
}

impl AnalysisAssistant {
    /// Compile the pipeline around an existing context
    pub fn new(ctx: PipelineContext) -> Result<Self> {
        Ok(Self {
            graph: build_pipeline_graph(Arc::new(ctx))?,
        })
    }

    /// Wire the production collaborators from configuration
    pub async fn from_config(config: &PipelineConfig, data_dir: &Path) -> Result<Self> {
        let client = OpenAiCompatibleClient::new(config.llm.base_url.clone())
            .with_api_key(config.llm.api_key.clone())
            .with_chat_model(config.llm.chat_model.clone())
            .with_embedding_model(config.llm.embedding_model.clone());

        let embedder: Arc<dyn Embedder> = if config.llm.e5_prefixes {
            Arc::new(PrefixedEmbedder::new(client.clone()))
        } else {
            Arc::new(client.clone())
        };

        let manifest = config.dataset_manifest(data_dir);
        let registry = if tokio::fs::try_exists(&manifest).await? {
            InMemoryDatasetRegistry::from_manifest(&manifest).await?
        } else {
            log::warn!("No dataset manifest at {:?}; no datasets are registered", manifest);
            InMemoryDatasetRegistry::new()
        };

        let index_dir = config.index_dir(data_dir);
        let preprocessed_dir = config.preprocessed_dir(data_dir);
        tokio::fs::create_dir_all(&index_dir).await?;
        tokio::fs::create_dir_all(&preprocessed_dir).await?;

        let retrieval = RetrievalService::new(index_dir, embedder)
            .with_chunk_config(ChunkConfig {
                chunk_size: config.retrieval.chunk_size,
                chunk_overlap: config.retrieval.chunk_overlap,
            })
            .with_batch_size(config.retrieval.batch_size);

        let sandbox = SandboxExecutor::new()
            .with_interpreter(config.sandbox.interpreter.clone())
            .with_timeout(Duration::from_secs(config.sandbox.timeout_secs));

        let client = Arc::new(client);
        let ctx = PipelineContext::new(
            client.clone(),
            client,
            Arc::new(registry),
            Arc::new(retrieval),
            preprocessed_dir,
        )
        .with_planner(ChartPlanner::new().with_max_points(config.sandbox.max_points))
        .with_sandbox(Arc::new(sandbox))
        .with_top_k(config.retrieval.top_k)
        .with_chart_sample_rows(config.sandbox.max_sample_rows)
        .with_preprocess_max_rows(config.preprocess.max_rows);

        log::info!(
            "Analysis assistant ready (model server {}, chat model {})",
            config.llm.base_url,
            config.llm.chat_model
        );
        Self::new(ctx)
    }

    /// Answer a question as a stream of progress events
    ///
    /// The stream ends with exactly one `done` or `error` event.
    pub fn invoke(&self, request: InvokeRequest) -> ProgressStream {
        let graph = self.graph.clone();

        Box::pin(stream! {
            if request.question.trim().is_empty() {
                yield ProgressEvent::Done {
                    answer: messages::EMPTY_QUESTION.to_string(),
                    thought_steps: Vec::new(),
                    preprocess_result: None,
                    visualization_result: None,
                };
                return;
            }

            log::info!(
                "Session '{}': answering (dataset {:?}, source {:?})",
                request.session_id,
                request.dataset_id,
                request.source_id
            );

            let mut tracker = ThoughtTracker::new();
            let mut last: Option<PipelineState> = None;
            let mut snapshots = graph.run(PipelineState::new(request.into_context()));

            while let Some(item) = snapshots.next().await {
                match item {
                    Ok(snapshot) => {
                        if let Some(step) = tracker.observe(&snapshot.node, &snapshot.state) {
                            yield ProgressEvent::Thought(step);
                        }
                        last = Some(snapshot.state);
                    }
                    Err(NodeEngineError::NodeFatal { node, message }) => {
                        yield ProgressEvent::Error { node, message };
                        return;
                    }
                    Err(e) => {
                        log::error!("Run aborted: {}", e);
                        yield ProgressEvent::Error {
                            node: String::new(),
                            message: e.to_string(),
                        };
                        return;
                    }
                }
            }

            let Some(state) = last else {
                yield ProgressEvent::Error {
                    node: String::new(),
                    message: "The run produced no result".to_string(),
                };
                return;
            };

            let answer = state
                .output
                .answer
                .as_ref()
                .map(|a| a.content.as_str())
                .unwrap_or_default();
            for delta in answer_chunks(answer) {
                yield ProgressEvent::Chunk { delta };
            }
            yield ProgressEvent::done(&state, tracker.into_steps());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_pipeline_graph;
    use crate::constants::limits;
    use crate::state::{IndexState, OutputKind, PreprocessStatus};
    use async_trait::async_trait;
    use capabilities::{
        CompletionRequest, CsvSampleReader, DatasetRecord, EmbedDocuments, EmbedQuery, JsonSchema,
        PortError, ReadTabularSample, StructuredCompletion, Table, TextCompletion,
    };
    use chart_sandbox::error::SandboxError;
    use chart_sandbox::{ExecutionStatus, ProcessCommand, ProcessOutput, ProcessSupervisor};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// Canned model: structured answers keyed by schema name, one text reply
    #[derive(Default)]
    struct MockLlm {
        structured: HashMap<&'static str, Value>,
        text: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl MockLlm {
        fn respond(mut self, schema: &'static str, value: Value) -> Self {
            self.structured.insert(schema, value);
            self
        }

        fn text(mut self, text: &'static str) -> Self {
            self.text = Some(text);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TextCompletion for MockLlm {
        async fn complete(&self, _request: &CompletionRequest) -> std::result::Result<String, PortError> {
            self.calls.lock().push("text".to_string());
            self.text
                .map(str::to_string)
                .ok_or_else(|| PortError::Unavailable("model offline".to_string()))
        }
    }

    #[async_trait]
    impl StructuredCompletion for MockLlm {
        async fn complete_json(
            &self,
            schema: &JsonSchema,
            _request: &CompletionRequest,
        ) -> std::result::Result<Value, PortError> {
            self.calls.lock().push(schema.name.clone());
            self.structured
                .get(schema.name.as_str())
                .cloned()
                .ok_or_else(|| PortError::Unavailable("model offline".to_string()))
        }
    }

    const VOCABULARY: [&str; 3] = ["north", "south", "revenue"];

    /// Keyword counts plus a constant component so no vector is zero
    struct KeywordEmbedder;

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        vector.push(1.0);
        vector
    }

    #[async_trait]
    impl EmbedDocuments for KeywordEmbedder {
        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, PortError> {
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }
    }

    #[async_trait]
    impl EmbedQuery for KeywordEmbedder {
        async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, PortError> {
            Ok(keyword_vector(text))
        }
    }

    impl Embedder for KeywordEmbedder {
        fn model_id(&self) -> &str {
            "keywords"
        }
    }

    /// Pretends to render by writing a fixed output file
    struct FakeRenderer {
        output_filename: &'static str,
    }

    #[async_trait]
    impl ProcessSupervisor for FakeRenderer {
        async fn run(
            &self,
            command: &ProcessCommand,
            _timeout: Duration,
        ) -> std::result::Result<ProcessOutput, SandboxError> {
            std::fs::write(command.cwd.join(self.output_filename), b"\x89PNG")?;
            Ok(ProcessOutput::default())
        }
    }

    /// CSV reader that remembers every row limit it was asked for
    #[derive(Default)]
    struct RecordingReader {
        limits: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ReadTabularSample for RecordingReader {
        async fn read_sample(
            &self,
            path: &std::path::Path,
            max_rows: usize,
        ) -> std::result::Result<Table, PortError> {
            self.limits.lock().push(max_rows);
            CsvSampleReader::new().read_sample(path, max_rows).await
        }
    }

    const SALES_CSV: &str = "region,revenue\nnorth,10\nsouth,\nnorth,14\nsouth,9\n";

    struct Fixture {
        dir: TempDir,
        llm: Arc<MockLlm>,
    }

    impl Fixture {
        fn new(llm: MockLlm) -> Self {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("sales.csv"), SALES_CSV).unwrap();
            Self {
                dir,
                llm: Arc::new(llm),
            }
        }

        fn preprocessed_dir(&self) -> PathBuf {
            self.dir.path().join("preprocessed")
        }

        fn context(&self) -> PipelineContext {
            let registry = InMemoryDatasetRegistry::with_records([DatasetRecord {
                dataset_id: "7".to_string(),
                source_id: "src-sales".to_string(),
                storage_path: self.dir.path().join("sales.csv"),
            }]);
            let retrieval =
                RetrievalService::new(self.dir.path().join("indices"), Arc::new(KeywordEmbedder));
            let sandbox = SandboxExecutor::new().with_supervisor(Arc::new(FakeRenderer {
                output_filename: "viz_hist.png",
            }));
            PipelineContext::new(
                self.llm.clone(),
                self.llm.clone(),
                Arc::new(registry),
                Arc::new(retrieval),
                self.preprocessed_dir(),
            )
            .with_sandbox(Arc::new(sandbox))
        }

        fn assistant(&self) -> AnalysisAssistant {
            AnalysisAssistant::new(self.context()).unwrap()
        }

        async fn final_state(&self, request: InvokeRequest) -> PipelineState {
            build_pipeline_graph(Arc::new(self.context()))
                .unwrap()
                .invoke(PipelineState::new(request.into_context()))
                .await
                .unwrap()
        }
    }

    async fn collect(assistant: &AnalysisAssistant, request: InvokeRequest) -> Vec<ProgressEvent> {
        assistant.invoke(request).collect().await
    }

    fn answer_of(events: &[ProgressEvent]) -> (String, usize) {
        match events.last() {
            Some(ProgressEvent::Done {
                answer,
                thought_steps,
                ..
            }) => (answer.clone(), thought_steps.len()),
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_question_answers_without_running() {
        let fixture = Fixture::new(MockLlm::default().text("unused"));
        let events = collect(&fixture.assistant(), InvokeRequest::new("s", "   ")).await;

        assert_eq!(events.len(), 1);
        assert_eq!(answer_of(&events), (messages::EMPTY_QUESTION.to_string(), 0));
        assert!(fixture.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_general_question_streams_answer() {
        let fixture = Fixture::new(MockLlm::default().text("Paris is the capital of France."));
        let events = collect(
            &fixture.assistant(),
            InvokeRequest::new("s", "What is the capital of France?"),
        )
        .await;

        let deltas: String = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Chunk { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, "Paris is the capital of France.");
        let (answer, steps) = answer_of(&events);
        assert_eq!(answer, "Paris is the capital of France.");
        assert_eq!(steps, 2);
        assert_eq!(fixture.llm.calls(), vec!["text".to_string()]);
    }

    #[tokio::test]
    async fn test_general_answer_failure_ends_with_error() {
        let fixture = Fixture::new(MockLlm::default());
        let events = collect(&fixture.assistant(), InvokeRequest::new("s", "Hello?")).await;

        match events.last() {
            Some(ProgressEvent::Error { node, message }) => {
                assert_eq!(node, "general_answer");
                assert!(message.contains("model offline"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_report_path_falls_back_to_metrics_template() {
        let llm = MockLlm::default()
            .respond(
                "intent_decision",
                json!({"step": "data_pipeline", "ask_report": true}),
            )
            .respond(
                "preprocess_decision",
                json!({"step": "skip_preprocess", "reason": "Data is clean enough."}),
            )
            .respond(
                "insight",
                json!({"insight_summary": "North leads on revenue.", "evidence_summary": "rows"}),
            );
        let fixture = Fixture::new(llm);
        let request = InvokeRequest::new("s", "Write a report on revenue").with_dataset("7");

        let state = fixture.final_state(request.clone()).await;
        let report = state.report.result.as_ref().unwrap();
        assert_eq!(report.metrics.source_id.as_deref(), Some("src-sales"));
        assert_eq!(report.metrics.row_count, 4);
        assert_eq!(report.metrics.missing.missing_cells, 1);
        assert!(report.visualizations.is_empty());
        assert_eq!(
            state.retrieval.index_status.as_ref().map(|s| s.status),
            Some(IndexState::Created)
        );
        let answer = state.output.answer.as_ref().unwrap();
        assert_eq!(answer.kind, OutputKind::ReportAnswer);
        assert!(answer
            .content
            .starts_with("The dataset 'src-sales' has 4 rows and 2 columns"));
        assert!(answer.content.contains("North leads on revenue."));

        // The index built by the first run is reused
        let events = collect(&fixture.assistant(), request).await;
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Thought(step) if step.message == "Using the existing index for 'src-sales'."
        )));
        assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_keyword_fallback_renders_requested_chart() {
        let fixture = Fixture::new(MockLlm::default());
        let request =
            InvokeRequest::new("s", "Show a histogram of revenue").with_source("src-sales");
        let events = collect(&fixture.assistant(), request).await;

        match events.last() {
            Some(ProgressEvent::Done {
                answer,
                visualization_result: Some(result),
                preprocess_result: Some(preprocess),
                ..
            }) => {
                assert_eq!(result.status, ExecutionStatus::Generated);
                let artifact = result.artifact.as_ref().unwrap();
                assert_eq!(artifact.mime_type, "image/png");
                assert!(!artifact.image_base64.is_empty());
                assert_eq!(preprocess.status, PreprocessStatus::Skipped);
                assert!(answer.contains("Generated a hist chart"));
            }
            other => panic!("expected done with a chart, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requested_preprocessing_indexes_the_new_copy() {
        let llm = MockLlm::default()
            .respond(
                "intent_decision",
                json!({"step": "data_pipeline", "ask_preprocess": true}),
            )
            .respond(
                "preprocess_plan",
                json!({"operations": [{"op": "drop_missing", "how": "any"}]}),
            )
            .text("Revenue is highest in the north.");
        let fixture = Fixture::new(llm);
        let state = fixture
            .final_state(InvokeRequest::new("s", "Clean the data, then compare revenue").with_dataset("7"))
            .await;

        let result = state.preprocess.result.as_ref().unwrap();
        assert_eq!(result.status, PreprocessStatus::Applied);
        assert_eq!(result.applied_ops_count, 1);
        let output_id = result.output_source_id.clone().unwrap();
        assert!(output_id.starts_with("src-sales-preprocessed-"));

        let written = std::fs::read_to_string(result.output_path.as_ref().unwrap()).unwrap();
        assert_eq!(written.lines().count(), 4);
        assert_eq!(result.rows_written, 3);
        assert!(!result.truncated);
        assert!(result
            .output_path
            .as_ref()
            .unwrap()
            .starts_with(fixture.preprocessed_dir()));

        let index = state.retrieval.index_status.as_ref().unwrap();
        assert_eq!(index.source_id.as_deref(), Some(output_id.as_str()));
        assert_eq!(index.status, IndexState::Created);
        assert_eq!(
            state.output.answer.as_ref().map(|a| a.content.as_str()),
            Some("Revenue is highest in the north.")
        );
        // An explicit request skips the decision call
        assert!(!fixture
            .llm
            .calls()
            .contains(&"preprocess_decision".to_string()));
    }

    #[tokio::test]
    async fn test_preprocessing_reads_a_bounded_sample() {
        let llm = MockLlm::default()
            .respond(
                "intent_decision",
                json!({"step": "data_pipeline", "ask_preprocess": true}),
            )
            .respond(
                "preprocess_plan",
                json!({"operations": [{"op": "drop_missing", "how": "any"}]}),
            )
            .text("Revenue is highest in the north.");
        let fixture = Fixture::new(llm);
        let reader = Arc::new(RecordingReader::default());
        let ctx = fixture
            .context()
            .with_reader(reader.clone())
            .with_preprocess_max_rows(2);

        let state = build_pipeline_graph(Arc::new(ctx))
            .unwrap()
            .invoke(PipelineState::new(
                InvokeRequest::new("s", "Clean the data").with_dataset("7").into_context(),
            ))
            .await
            .unwrap();

        let requested = reader.limits.lock().clone();
        assert!(requested.contains(&3));
        assert!(requested.iter().all(|&rows| rows <= limits::REPORT_SAMPLE_ROWS));

        // Only north,10 and south,<empty> are read; drop_missing keeps one row
        let result = state.preprocess.result.as_ref().unwrap();
        assert_eq!(result.status, PreprocessStatus::Applied);
        assert!(result.truncated);
        assert_eq!(result.rows_written, 1);
        let written = std::fs::read_to_string(result.output_path.as_ref().unwrap()).unwrap();
        assert_eq!(written, "region,revenue\nnorth,10\n");
    }
}
