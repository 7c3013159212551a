//! Plan execution in a supervised interpreter process

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use capabilities::{CsvSampleReader, ReadTabularSample, Table};

use crate::columns::parse_datetime;
use crate::defaults;
use crate::supervisor::{ProcessCommand, ProcessSupervisor, TokioProcessSupervisor};
use crate::types::{
    ChartArtifact, ChartExecution, ChartSpec, ChartType, ExecutionStatus, FailureKind,
    SandboxRunResult, VisualizationPlan,
};

/// File name the script is written to inside the run directory
const SCRIPT_FILENAME: &str = "render_chart.py";
const ARTIFACT_MIME_TYPE: &str = "image/png";

/// Whether the chosen axes still hold at least one drawable row
pub fn chart_has_data(
    table: &Table,
    chart_type: ChartType,
    x_key: &str,
    y_key: &str,
    x_is_temporal: bool,
) -> bool {
    let column = |key: &str| {
        if key.is_empty() {
            None
        } else {
            table.column_values(key)
        }
    };

    match chart_type {
        ChartType::Scatter | ChartType::Line | ChartType::Bar => {
            match (column(x_key), column(y_key)) {
                (Some(x), Some(y)) => {
                    let parse_x = chart_type == ChartType::Line && x_is_temporal;
                    any_pair(&x, &y, parse_x)
                }
                _ => false,
            }
        }
        ChartType::Hist => column(x_key).is_some_and(|x| x.iter().any(Option::is_some)),
        ChartType::Box => match (column(x_key), column(y_key)) {
            (Some(x), Some(y)) => any_pair(&x, &y, false),
            (None, Some(y)) => y.iter().any(Option::is_some),
            _ => false,
        },
    }
}

/// Runs planned chart scripts under a deadline
pub struct SandboxExecutor {
    supervisor: Arc<dyn ProcessSupervisor>,
    reader: Arc<dyn ReadTabularSample>,
    interpreter: String,
    timeout: Duration,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self {
            supervisor: Arc::new(TokioProcessSupervisor::new()),
            reader: Arc::new(CsvSampleReader::new()),
            interpreter: defaults::INTERPRETER.to_string(),
            timeout: Duration::from_secs(defaults::SCRIPT_TIMEOUT_SECS),
        }
    }
}

impl SandboxExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn ReadTabularSample>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `plan` against the dataset at `dataset_path`
    ///
    /// Never fails: every problem is reported as an unavailable result with
    /// a [`FailureKind`] and a human-readable summary. The run directory is
    /// removed before returning.
    pub async fn execute(
        &self,
        plan: &VisualizationPlan,
        dataset_path: &Path,
        max_samples: usize,
    ) -> ChartExecution {
        let Some(chart_type) = plan.chart_type.filter(|_| plan.is_planned()) else {
            let summary = if plan.reason.is_empty() {
                "No chart was planned, so execution was skipped.".to_string()
            } else {
                plan.reason.clone()
            };
            return ChartExecution::unavailable(FailureKind::PlanUnavailable, summary);
        };
        if plan.python_code.is_empty() || !is_plain_filename(&plan.output_filename) {
            return ChartExecution::unavailable(
                FailureKind::PlanUnavailable,
                "The chart plan has no runnable script.",
            );
        }

        let sample = match self.reader.read_sample(dataset_path, max_samples).await {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Chart revalidation could not read {:?}: {}", dataset_path, e);
                return ChartExecution::unavailable(
                    FailureKind::ValidationFailed,
                    format!("The dataset could not be read: {}", e),
                );
            }
        };
        if sample.is_empty()
            || !chart_has_data(&sample, chart_type, &plan.x_key, &plan.y_key, plan.x_is_temporal)
        {
            return ChartExecution::unavailable(
                FailureKind::ValidationFailed,
                "The selected columns have no usable values to chart.",
            );
        }

        let run = match self.run_script(plan).await {
            Ok(run) => run,
            Err(message) => {
                return ChartExecution::unavailable(FailureKind::ProcessFailed, message);
            }
        };
        interpret_run(plan, chart_type, run)
    }

    /// Write the script into a fresh directory and run it there
    async fn run_script(&self, plan: &VisualizationPlan) -> Result<SandboxRunResult, String> {
        let dir = tempfile::Builder::new()
            .prefix("viz_exec_")
            .tempdir()
            .map_err(|e| format!("Could not create a run directory: {}", e))?;
        let script_path = dir.path().join(SCRIPT_FILENAME);
        tokio::fs::write(&script_path, &plan.python_code)
            .await
            .map_err(|e| format!("Could not write the chart script: {}", e))?;

        let command = ProcessCommand {
            program: self.interpreter.clone(),
            args: vec![script_path.to_string_lossy().into_owned()],
            cwd: dir.path().to_path_buf(),
        };
        log::debug!("Running chart script in {:?}", dir.path());

        let output = self
            .supervisor
            .run(&command, self.timeout)
            .await
            .map_err(|e| format!("The chart script could not be started: {}", e))?;

        let artifact = if output.timed_out {
            None
        } else {
            tokio::fs::read(dir.path().join(&plan.output_filename))
                .await
                .ok()
        };

        Ok(SandboxRunResult {
            timed_out: output.timed_out,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            artifact,
        })
    }
}

fn any_pair(x: &[Option<&str>], y: &[Option<&str>], parse_x: bool) -> bool {
    x.iter().zip(y).any(|pair| match pair {
        (Some(x), Some(_)) => !parse_x || parse_datetime(x).is_some(),
        _ => false,
    })
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name().is_some_and(|f| f == name)
}

fn interpret_run(
    plan: &VisualizationPlan,
    chart_type: ChartType,
    run: SandboxRunResult,
) -> ChartExecution {
    if run.timed_out {
        return ChartExecution::unavailable(
            FailureKind::TimedOut,
            "The chart script ran out of time and was stopped.",
        );
    }

    let artifact = match run.artifact {
        Some(bytes) if run.exit_code == 0 => bytes,
        _ => {
            let detail = run
                .stderr
                .trim()
                .lines()
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if run.exit_code == 0 {
                        "the script finished without writing an image".to_string()
                    } else {
                        format!("the script exited with code {}", run.exit_code)
                    }
                });
            log::warn!("Chart script failed: {}", detail);
            return ChartExecution::unavailable(
                FailureKind::ProcessFailed,
                format!("Chart rendering failed: {}", detail),
            );
        }
    };

    let axes = match (plan.x_key.is_empty(), plan.y_key.is_empty()) {
        (false, false) => format!("{} vs {}", plan.x_key, plan.y_key),
        (false, true) => plan.x_key.clone(),
        (true, false) => plan.y_key.clone(),
        (true, true) => "-".to_string(),
    };

    ChartExecution {
        status: ExecutionStatus::Generated,
        failure: None,
        summary: format!("Generated a {} chart of {}.", chart_type, axes),
        chart: Some(ChartSpec {
            chart_type,
            x_key: plan.x_key.clone(),
            y_key: plan.y_key.clone(),
        }),
        artifact: Some(ChartArtifact {
            mime_type: ARTIFACT_MIME_TYPE.to_string(),
            image_base64: base64::engine::general_purpose::STANDARD.encode(artifact),
            code: plan.python_code.clone(),
        }),
    }
}
