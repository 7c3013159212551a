//! Plan and result types

use serde::{Deserialize, Serialize};

/// Supported chart kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Scatter,
    Line,
    Bar,
    Hist,
    Box,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Scatter => "scatter",
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Hist => "hist",
            ChartType::Box => "box",
        }
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    Unavailable,
}

/// Whether the chart type came from the user or was chosen automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Auto,
    Specified,
}

/// A chart plan. Unavailable plans carry a reason and no code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationPlan {
    pub status: PlanStatus,
    pub mode: PlanMode,
    pub chart_type: Option<ChartType>,
    pub x_key: String,
    pub y_key: String,
    pub reason: String,
    pub python_code: String,
    pub output_filename: String,
    pub x_is_temporal: bool,
}

impl VisualizationPlan {
    pub fn unavailable(
        mode: PlanMode,
        chart_type: Option<ChartType>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: PlanStatus::Unavailable,
            mode,
            chart_type,
            x_key: String::new(),
            y_key: String::new(),
            reason: reason.into(),
            python_code: String::new(),
            output_filename: String::new(),
            x_is_temporal: false,
        }
    }

    pub fn is_planned(&self) -> bool {
        self.status == PlanStatus::Planned
    }
}

/// Raw outcome of one sandbox run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SandboxRunResult {
    pub timed_out: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Bytes of the output file, when the script produced one
    pub artifact: Option<Vec<u8>>,
}

/// Why a chart could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PlanUnavailable,
    ValidationFailed,
    TimedOut,
    ProcessFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Generated,
    Unavailable,
}

/// Axes of a rendered chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub x_key: String,
    pub y_key: String,
}

/// Encoded chart image plus the code that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub mime_type: String,
    pub image_base64: String,
    pub code: String,
}

/// Result of executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartExecution {
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ChartArtifact>,
}

impl ChartExecution {
    pub fn unavailable(failure: FailureKind, summary: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Unavailable,
            failure: Some(failure),
            summary: summary.into(),
            chart: None,
            artifact: None,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.status == ExecutionStatus::Generated
    }
}
