//! Chart planning and sandboxed rendering

use std::path::Path;
use std::sync::Arc;

use capabilities::Table;
use chart_sandbox::{
    detect_requested_chart_type, ChartExecution, ChartPlanner, ColumnSets, FailureKind, PlanMode,
    VisualizationPlan,
};

use super::{resolve_target, PipelineContext, Target};
use crate::state::{PipelineState, StateUpdate, VisualizationState};

fn unavailable_plan(question: &str, reason: impl Into<String>) -> VisualizationPlan {
    let requested = detect_requested_chart_type(question);
    let mode = if requested.is_some() {
        PlanMode::Specified
    } else {
        PlanMode::Auto
    };
    VisualizationPlan::unavailable(mode, requested, reason)
}

/// Column classes from the dataset profile, when it describes `source_id`
///
/// A preprocessed copy can have dropped, renamed or derived columns, so a
/// profile of the original file only applies to that file.
fn profile_columns(state: &PipelineState, source_id: &str) -> Option<ColumnSets> {
    let profile = state.preprocess.profile.as_ref()?;
    if !profile.available || profile.source_id.as_deref() != Some(source_id) {
        return None;
    }
    Some(ColumnSets {
        numeric: profile.numeric_columns.clone(),
        temporal: profile.temporal_columns.clone(),
        categorical: profile.categorical_columns.clone(),
    })
}

fn plan_chart(
    planner: &ChartPlanner,
    state: &PipelineState,
    sample: &Table,
    source_id: &str,
    dataset_path: &Path,
) -> VisualizationPlan {
    let question = state.request.question.trim();
    match profile_columns(state, source_id) {
        Some(columns) if !sample.is_empty() => planner.plan_with_columns(
            &columns,
            detect_requested_chart_type(question),
            dataset_path,
        ),
        _ => planner.plan(sample, None, question, dataset_path),
    }
}

/// Plan a chart for the target dataset
pub async fn visualization_planner(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let question = state.request.question.trim();
    let plan = match resolve_target(&ctx, &state).await {
        Target::Found(record) => {
            match ctx
                .reader
                .read_sample(&record.storage_path, ctx.chart_sample_rows)
                .await
            {
                Ok(sample) => plan_chart(
                    &ctx.planner,
                    &state,
                    &sample,
                    &record.source_id,
                    &record.storage_path,
                ),
                Err(e) => {
                    log::warn!("Could not sample {:?} for charting: {}", record.storage_path, e);
                    unavailable_plan(question, format!("The dataset could not be read: {}", e))
                }
            }
        }
        Target::Missing(id) => {
            unavailable_plan(question, format!("Dataset '{}' was not found.", id))
        }
        Target::None => unavailable_plan(question, "No dataset is selected."),
    };

    log::info!(
        "Visualization plan: {:?} {:?} ({})",
        plan.status,
        plan.chart_type,
        plan.reason
    );
    Ok(StateUpdate::new().visualization(VisualizationState {
        plan: Some(plan),
        ..Default::default()
    }))
}

/// Run the planned chart script in the sandbox
pub async fn visualization_executor(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let result = match &state.visualization.plan {
        None => ChartExecution::unavailable(
            FailureKind::PlanUnavailable,
            "No chart was planned, so execution was skipped.",
        ),
        Some(plan) if !plan.is_planned() => {
            ChartExecution::unavailable(FailureKind::PlanUnavailable, plan.reason.clone())
        }
        Some(plan) => match resolve_target(&ctx, &state).await {
            Target::Found(record) => {
                ctx.sandbox
                    .execute(plan, &record.storage_path, ctx.chart_sample_rows)
                    .await
            }
            _ => ChartExecution::unavailable(
                FailureKind::ValidationFailed,
                "The dataset for this chart is no longer available.",
            ),
        },
    };

    log::info!("Visualization result: {:?} ({})", result.status, result.summary);
    Ok(StateUpdate::new().visualization(VisualizationState {
        result: Some(result),
        ..Default::default()
    }))
}
