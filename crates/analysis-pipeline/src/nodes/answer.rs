//! Terminal answer nodes for the data pipeline

use std::sync::Arc;

use chart_sandbox::ExecutionStatus;

use super::{completion, resolve_target, PipelineContext, Target};
use crate::constants::limits;
use crate::metrics::{build_metrics, ReportMetrics};
use crate::state::{
    OutputKind, PipelineState, ReportResult, ReportState, ReportVisualization, StateUpdate,
};

const REPORT_SYSTEM: &str = "Write a short analysis report for the user. Ground every statement \
in the metrics, the insight and the chart summary you are given. Do not invent numbers.";

const ANSWER_SYSTEM: &str = "Answer the user's question from the dataset evidence you are given. \
If the evidence does not answer the question, say so.";

fn insight_summary(state: &PipelineState) -> String {
    state
        .retrieval
        .insight
        .as_ref()
        .map(|i| i.summary.clone())
        .unwrap_or_default()
}

fn visualization_summary(state: &PipelineState) -> Option<String> {
    state
        .visualization
        .result
        .as_ref()
        .map(|r| r.summary.clone())
        .filter(|s| !s.is_empty())
}

/// Join the non-empty parts with a blank line
fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn report_metrics(ctx: &PipelineContext, state: &PipelineState) -> ReportMetrics {
    match resolve_target(ctx, state).await {
        Target::Found(record) => {
            match ctx
                .reader
                .read_sample(&record.storage_path, limits::REPORT_SAMPLE_ROWS)
                .await
            {
                Ok(table) => build_metrics(&table, Some(record.source_id)),
                Err(e) => {
                    log::warn!("Could not read {:?} for metrics: {}", record.storage_path, e);
                    ReportMetrics::empty(Some(record.source_id))
                }
            }
        }
        Target::Missing(id) => ReportMetrics::empty(Some(id)),
        Target::None => ReportMetrics::empty(None),
    }
}

fn fallback_report(metrics: &ReportMetrics, insight: &str, chart: Option<&str>) -> String {
    let overview = format!(
        "The dataset{} has {} rows and {} columns; {:.1}% of cells are missing.",
        metrics
            .source_id
            .as_deref()
            .map(|id| format!(" '{}'", id))
            .unwrap_or_default(),
        metrics.row_count,
        metrics.column_count,
        metrics.missing.missing_rate * 100.0
    );
    let correlation = metrics.top_correlations.first().map(|c| {
        format!(
            "The strongest correlation is between {} and {} (r = {}).",
            c.column_1, c.column_2, c.correlation
        )
    });
    join_parts(
        [
            Some(overview.as_str()),
            correlation.as_deref(),
            Some(insight),
            chart,
        ]
        .into_iter()
        .flatten(),
    )
}

/// Compose a report from metrics, insight and chart
pub async fn report_composer(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let metrics = report_metrics(&ctx, &state).await;
    let insight = insight_summary(&state);
    let chart_summary = visualization_summary(&state);

    let visualizations: Vec<ReportVisualization> = state
        .visualization
        .result
        .iter()
        .filter(|r| r.status == ExecutionStatus::Generated)
        .filter_map(|r| {
            r.chart.clone().map(|chart| ReportVisualization {
                chart,
                artifact: r.artifact.clone(),
            })
        })
        .collect();

    let metrics_json = serde_json::to_string(&metrics).unwrap_or_else(|_| "{}".to_string());
    let prompt = format!(
        "question={}\nmetrics={}\ninsight={}\nchart={}",
        state.request.question.trim(),
        metrics_json,
        insight,
        chart_summary.as_deref().unwrap_or("none")
    );
    let request = completion(&state, REPORT_SYSTEM, prompt);
    let summary = match ctx.text.complete(&request).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback_report(&metrics, &insight, chart_summary.as_deref()),
        Err(e) => {
            log::warn!("Report composition failed, using template: {}", e);
            fallback_report(&metrics, &insight, chart_summary.as_deref())
        }
    };

    Ok(StateUpdate::new()
        .report(ReportState {
            result: Some(ReportResult {
                summary: summary.clone(),
                metrics,
                visualizations,
            }),
        })
        .answer(OutputKind::ReportAnswer, summary))
}

/// Answer the question from retrieved evidence
pub async fn data_answer(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let insight = insight_summary(&state);
    let chart_summary = visualization_summary(&state);
    let evidence = state
        .retrieval
        .insight
        .as_ref()
        .map(|i| i.evidence_summary.as_str())
        .unwrap_or_default();
    let context = state
        .retrieval
        .result
        .as_ref()
        .map(|r| r.context.as_str())
        .unwrap_or_default();

    let prompt = format!(
        "question={}\ninsight={}\nevidence={}\ncontext=\n{}\nchart={}",
        state.request.question.trim(),
        insight,
        evidence,
        context,
        chart_summary.as_deref().unwrap_or("none")
    );
    let request = completion(&state, ANSWER_SYSTEM, prompt);
    let fallback = || join_parts([insight.as_str(), chart_summary.as_deref().unwrap_or("")]);
    let answer = match ctx.text.complete(&request).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback(),
        Err(e) => {
            log::warn!("Data answer failed, using the insight: {}", e);
            fallback()
        }
    };

    Ok(StateUpdate::new().answer(OutputKind::DataAnswer, answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Correlation;

    #[test]
    fn test_fallback_report_mentions_shape_and_chart() {
        let metrics = ReportMetrics {
            source_id: Some("sales".to_string()),
            row_count: 10,
            column_count: 3,
            top_correlations: vec![Correlation {
                column_1: "price".to_string(),
                column_2: "units".to_string(),
                correlation: -0.8,
            }],
            ..Default::default()
        };
        let text = fallback_report(&metrics, "", Some("Generated a bar chart of region by sales."));
        assert!(text.starts_with("The dataset 'sales' has 10 rows and 3 columns; 0.0%"));
        assert!(text.contains("price and units (r = -0.8)"));
        assert!(text.ends_with("Generated a bar chart of region by sales."));
    }

    #[test]
    fn test_join_parts_skips_blank() {
        assert_eq!(join_parts(["a ", "", "  ", "b"]), "a\n\nb");
    }
}
