//! Dataset profiling and preprocessing

use std::sync::Arc;

use capabilities::{complete_structured, write_csv, JsonSchema, StructuredOutput};
use chart_sandbox::classify_columns;
use serde::Deserialize;
use serde_json::json;

use super::{decision_request, resolve_selected, PipelineContext, Target};
use crate::constants::limits;
use crate::state::{
    DatasetProfile, PipelineState, PreprocessDecision, PreprocessPlan, PreprocessResult,
    PreprocessState, PreprocessStatus, PreprocessStep, StateUpdate,
};
use crate::transform::{apply_operations, PreprocessOperation};

const DECISION_SYSTEM: &str = "Look at the dataset profile and decide whether preprocessing is \
needed before analysis. Return run_preprocess or skip_preprocess with a short reason.";

const PLANNER_SYSTEM: &str = "You are a preprocessing planner. Produce operations using only: \
drop_missing, impute, drop_columns, rename_columns, scale, derived_column. Use column names \
exactly as they appear in the profile.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DecisionStep {
    RunPreprocess,
    SkipPreprocess,
}

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    step: DecisionStep,
    #[serde(default)]
    reason: String,
}

impl StructuredOutput for DecisionPayload {
    fn schema() -> JsonSchema {
        JsonSchema::new(
            "preprocess_decision",
            json!({
                "type": "object",
                "properties": {
                    "step": {"type": "string", "enum": ["run_preprocess", "skip_preprocess"]},
                    "reason": {"type": "string"}
                },
                "required": ["step", "reason"],
                "additionalProperties": false
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    operations: Vec<PreprocessOperation>,
}

impl StructuredOutput for PlanPayload {
    fn schema() -> JsonSchema {
        let columns = json!({"type": "array", "items": {"type": "string"}});
        JsonSchema::new(
            "preprocess_plan",
            json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {"oneOf": [
                            {"type": "object", "properties": {
                                "op": {"const": "drop_missing"},
                                "columns": columns,
                                "how": {"type": "string", "enum": ["any", "all"]}
                            }, "required": ["op"]},
                            {"type": "object", "properties": {
                                "op": {"const": "impute"},
                                "columns": columns,
                                "method": {"type": "string", "enum": ["mean", "median", "mode", "value"]},
                                "value": {"type": ["string", "number", "boolean", "null"]}
                            }, "required": ["op", "columns", "method"]},
                            {"type": "object", "properties": {
                                "op": {"const": "drop_columns"},
                                "columns": columns
                            }, "required": ["op", "columns"]},
                            {"type": "object", "properties": {
                                "op": {"const": "rename_columns"},
                                "rename_from": columns,
                                "rename_to": columns
                            }, "required": ["op", "rename_from", "rename_to"]},
                            {"type": "object", "properties": {
                                "op": {"const": "scale"},
                                "columns": columns,
                                "method": {"type": "string", "enum": ["standardize", "normalize"]}
                            }, "required": ["op", "columns", "method"]},
                            {"type": "object", "properties": {
                                "op": {"const": "derived_column"},
                                "name": {"type": "string"},
                                "expression": {"type": "string"}
                            }, "required": ["op", "name", "expression"]}
                        ]}
                    }
                },
                "required": ["operations"]
            }),
        )
    }
}

fn profile_prompt(state: &PipelineState) -> String {
    let profile = state
        .preprocess
        .profile
        .as_ref()
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!(
        "user_input={}\ndataset_profile={}",
        state.request.question.trim(),
        profile
    )
}

/// Profile a bounded sample of the selected dataset
pub async fn dataset_profile(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let profile = match resolve_selected(&ctx, &state).await {
        Target::Found(record) => {
            match ctx
                .reader
                .read_sample(&record.storage_path, limits::PROFILE_SAMPLE_ROWS)
                .await
            {
                Ok(sample) => {
                    let sets = classify_columns(&sample);
                    let rows = sample.row_count();
                    DatasetProfile {
                        available: true,
                        source_id: Some(record.source_id),
                        sample_rows: rows,
                        missing_ratio_by_column: sample
                            .columns
                            .iter()
                            .map(|c| {
                                let ratio = if rows > 0 {
                                    sample.null_count(c) as f64 / rows as f64
                                } else {
                                    0.0
                                };
                                (c.clone(), ratio)
                            })
                            .collect(),
                        columns: sample.columns,
                        numeric_columns: sets.numeric,
                        temporal_columns: sets.temporal,
                        categorical_columns: sets.categorical,
                    }
                }
                Err(e) => {
                    log::warn!("Could not profile {:?}: {}", record.storage_path, e);
                    DatasetProfile::unavailable()
                }
            }
        }
        Target::Missing(id) => {
            log::warn!("Selected dataset '{}' is not registered", id);
            DatasetProfile::unavailable()
        }
        Target::None => DatasetProfile::unavailable(),
    };

    Ok(StateUpdate::new().preprocess(PreprocessState {
        profile: Some(profile),
        ..Default::default()
    }))
}

/// Decide whether to preprocess
///
/// An explicit request always runs; a failed decision call skips.
pub async fn preprocess_decision(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let requested = state.handoff().is_some_and(|h| h.ask_preprocess);
    let profile_available = state
        .preprocess
        .profile
        .as_ref()
        .is_some_and(|p| p.available);

    let decision = if requested {
        PreprocessDecision {
            step: PreprocessStep::Run,
            reason: "Preprocessing was requested.".to_string(),
        }
    } else if !profile_available {
        PreprocessDecision {
            step: PreprocessStep::Skip,
            reason: "The dataset could not be profiled.".to_string(),
        }
    } else {
        let request = decision_request(&state, DECISION_SYSTEM, profile_prompt(&state));
        match complete_structured::<DecisionPayload>(ctx.structured.as_ref(), &request).await {
            Ok(payload) => PreprocessDecision {
                step: match payload.step {
                    DecisionStep::RunPreprocess => PreprocessStep::Run,
                    DecisionStep::SkipPreprocess => PreprocessStep::Skip,
                },
                reason: payload.reason,
            },
            Err(e) => {
                log::warn!("Preprocess decision failed: {}", e);
                PreprocessDecision {
                    step: PreprocessStep::Skip,
                    reason: format!("The preprocessing decision failed: {}", e),
                }
            }
        }
    };

    log::info!("Preprocess decision: {:?} ({})", decision.step, decision.reason);
    Ok(StateUpdate::new().preprocess(PreprocessState {
        decision: Some(decision),
        ..Default::default()
    }))
}

/// Ask for a list of preprocessing operations
pub async fn preprocess_planner(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let request = decision_request(&state, PLANNER_SYSTEM, profile_prompt(&state));
    let plan = match complete_structured::<PlanPayload>(ctx.structured.as_ref(), &request).await {
        Ok(payload) => PreprocessPlan {
            operations: payload.operations,
            error: None,
        },
        Err(e) => {
            log::warn!("Preprocess planning failed: {}", e);
            PreprocessPlan {
                operations: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    };

    Ok(StateUpdate::new().preprocess(PreprocessState {
        plan: Some(plan),
        ..Default::default()
    }))
}

/// Apply the plan to the selected dataset and write a new copy
pub async fn preprocess_executor(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let result = execute_plan(&ctx, &state).await;
    if let Some(error) = &result.error {
        log::warn!("Preprocessing failed: {}", error);
    }
    Ok(StateUpdate::new().preprocess(PreprocessState {
        result: Some(result),
        ..Default::default()
    }))
}

async fn execute_plan(ctx: &PipelineContext, state: &PipelineState) -> PreprocessResult {
    let operations = state
        .preprocess
        .plan
        .as_ref()
        .map(|p| p.operations.as_slice())
        .unwrap_or_default();
    if operations.is_empty() {
        return PreprocessResult::skipped();
    }

    let record = match resolve_selected(ctx, state).await {
        Target::Found(record) => record,
        Target::Missing(id) => {
            return PreprocessResult::failed(format!("Dataset '{}' was not found", id))
        }
        Target::None => return PreprocessResult::failed("No dataset is selected"),
    };

    // One extra row tells a file at the limit apart from a longer one
    let max_rows = ctx.preprocess_max_rows;
    let mut table = match ctx
        .reader
        .read_sample(&record.storage_path, max_rows.saturating_add(1))
        .await
    {
        Ok(table) => table,
        Err(e) => return PreprocessResult::failed(e.to_string()),
    };
    let truncated = table.rows.len() > max_rows;
    if truncated {
        table.rows.truncate(max_rows);
        log::warn!(
            "'{}' has more than {} rows; the preprocessed copy keeps the first {}",
            record.source_id,
            max_rows,
            max_rows
        );
    }
    let table = match apply_operations(table, operations) {
        Ok(table) => table,
        Err(e) => return PreprocessResult::failed(e.to_string()),
    };

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let output_source_id = format!("{}-preprocessed-{}", record.source_id, &suffix[..8]);
    let output_path = ctx.preprocessed_dir.join(format!("{}.csv", output_source_id));
    if let Err(e) = write_csv(&output_path, &table).await {
        return PreprocessResult::failed(e.to_string());
    }

    log::info!(
        "Applied {} operations to '{}', wrote {:?}",
        operations.len(),
        record.source_id,
        output_path
    );
    PreprocessResult {
        status: PreprocessStatus::Applied,
        applied_ops_count: operations.len(),
        output_source_id: Some(output_source_id),
        output_path: Some(output_path),
        rows_written: table.row_count(),
        truncated,
        error: None,
    }
}

pub async fn preprocess_skip(
    _ctx: Arc<PipelineContext>,
    _state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    Ok(StateUpdate::new().preprocess(PreprocessState {
        result: Some(PreprocessResult::skipped()),
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_payload_parses_operations() {
        let payload: PlanPayload = serde_json::from_value(json!({
            "operations": [
                {"op": "drop_missing", "how": "all"},
                {"op": "scale", "columns": ["price"], "method": "normalize"}
            ]
        }))
        .unwrap();
        assert_eq!(payload.operations.len(), 2);
        assert_eq!(payload.operations[1].name(), "scale");
    }

    #[test]
    fn test_decision_payload_steps() {
        let payload: DecisionPayload =
            serde_json::from_value(json!({"step": "run_preprocess", "reason": "nulls"})).unwrap();
        assert_eq!(payload.step, DecisionStep::RunPreprocess);
    }
}
