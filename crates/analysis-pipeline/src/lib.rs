//! Analysis pipeline
//!
//! Answers questions about tabular datasets by running a state graph:
//! intent intake, optional preprocessing, retrieval over an indexed copy of
//! the dataset, an optional sandboxed chart, and a report or direct answer.
//! Progress streams back as [`ProgressEvent`]s.

pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod nodes;
pub mod progress;
pub mod routing;
pub mod service;
pub mod state;
pub mod transform;

pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, Result};
pub use graph::{build_pipeline_graph, build_pipeline_graph_with_sink};
pub use metrics::{build_metrics, ReportMetrics};
pub use nodes::PipelineContext;
pub use progress::{ProgressEvent, ThoughtStatus, ThoughtStep};
pub use service::{AnalysisAssistant, InvokeRequest, ProgressStream};
pub use state::{PipelineState, StateUpdate};
pub use transform::{apply_operations, PreprocessOperation};
