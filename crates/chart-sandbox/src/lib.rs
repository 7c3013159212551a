//! Chart sandbox
//!
//! Turns a tabular sample into a declarative [`VisualizationPlan`], renders
//! the plan into a fixed matplotlib script, and runs that script in a
//! separate interpreter process under a hard deadline. Every failure comes
//! back as an `unavailable` [`ChartExecution`] value, never as an error.

pub mod columns;
pub mod error;
pub mod executor;
pub mod planner;
pub mod supervisor;
pub mod template;
pub mod types;

pub use columns::{classify_columns, parse_datetime, ColumnSets};
pub use executor::{chart_has_data, SandboxExecutor};
pub use planner::{detect_requested_chart_type, ChartPlanner};
pub use supervisor::{ProcessCommand, ProcessOutput, ProcessSupervisor, TokioProcessSupervisor};
pub use types::{
    ChartArtifact, ChartExecution, ChartSpec, ChartType, ExecutionStatus, FailureKind, PlanMode,
    PlanStatus, SandboxRunResult, VisualizationPlan,
};

/// Default limits, shared with callers that want to stay in step
pub mod defaults {
    /// Interpreter used to run chart scripts
    pub const INTERPRETER: &str = "python3";
    /// Hard deadline for a chart script
    pub const SCRIPT_TIMEOUT_SECS: u64 = 15;
    /// Rows sampled for planning and revalidation
    pub const MAX_SAMPLE_ROWS: usize = 2000;
    /// Points drawn per chart
    pub const MAX_POINTS: usize = 120;
    /// Interval between child status checks
    pub const POLL_INTERVAL_MS: u64 = 50;
}
