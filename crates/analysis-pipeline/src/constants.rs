//! Pipeline-wide constants
//!
//! Node names, sampling limits and fixed user-facing text live here so the
//! graph, the nodes and the progress stream agree on them.

/// Node names used in the pipeline graph
pub mod nodes {
    pub const INTAKE: &str = "intake";
    pub const GENERAL_ANSWER: &str = "general_answer";
    pub const DATASET_PROFILE: &str = "dataset_profile";
    pub const PREPROCESS_DECISION: &str = "preprocess_decision";
    pub const PREPROCESS_PLANNER: &str = "preprocess_planner";
    pub const PREPROCESS_EXECUTOR: &str = "preprocess_executor";
    pub const PREPROCESS_SKIP: &str = "preprocess_skip";
    pub const RAG_INDEX: &str = "rag_index";
    pub const RAG_RETRIEVE: &str = "rag_retrieve";
    pub const INSIGHT_SYNTHESIS: &str = "insight_synthesis";
    pub const VISUALIZATION_PLANNER: &str = "visualization_planner";
    pub const VISUALIZATION_EXECUTOR: &str = "visualization_executor";
    pub const REPORT_COMPOSER: &str = "report_composer";
    pub const DATA_ANSWER: &str = "data_answer";
}

/// Row and item limits
pub mod limits {
    /// Rows read when profiling a dataset
    pub const PROFILE_SAMPLE_ROWS: usize = 2000;
    /// Rows copied into a preprocessed dataset
    pub const PREPROCESS_MAX_ROWS: usize = 200_000;
    /// Rows read when computing report metrics
    pub const REPORT_SAMPLE_ROWS: usize = 5000;
    /// Chunks retrieved per question
    pub const RETRIEVAL_TOP_K: usize = 3;
    /// Numeric columns summarized in a report
    pub const NUMERIC_STATS_COLUMNS: usize = 8;
    /// Columns listed in the missing-value summary
    pub const TOP_MISSING_COLUMNS: usize = 5;
    /// Column pairs listed in the correlation summary
    pub const TOP_CORRELATIONS: usize = 5;
    /// Decimal places kept for report statistics
    pub const METRIC_DIGITS: i32 = 4;
    /// Characters per streamed answer chunk
    pub const ANSWER_CHUNK_CHARS: usize = 48;
}

/// Default values for configuration
pub mod defaults {
    /// Graph name reported in workflow events
    pub const GRAPH_NAME: &str = "analysis-pipeline";
    /// OpenAI-compatible server (Ollama's default port)
    pub const BASE_URL: &str = "http://127.0.0.1:11434";
    pub const CHAT_MODEL: &str = "llama3.1";
    pub const EMBEDDING_MODEL: &str = "multilingual-e5-small";
}

/// Data directory layout
pub mod paths {
    /// Name of the data directory under the platform data dir
    pub const APP_DIR: &str = "analysis-pipeline";
    pub const CONFIG_FILE: &str = "config.json";
    /// Per-source retrieval indices
    pub const INDEX_DIR: &str = "indices";
    /// Preprocessed dataset copies
    pub const PREPROCESSED_DIR: &str = "preprocessed";
    /// JSON array of dataset records
    pub const DATASET_MANIFEST: &str = "datasets.json";
}

/// Fixed user-facing text
pub mod messages {
    /// Answer for an empty question
    pub const EMPTY_QUESTION: &str = "Please enter a question.";
    pub const NO_EVIDENCE: &str = "No evidence directly related to the question was found.";
}
