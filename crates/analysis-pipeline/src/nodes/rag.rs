//! Indexing, retrieval and insight synthesis

use std::sync::Arc;

use capabilities::{complete_structured, JsonSchema, StructuredOutput};
use retrieval::{build_context, file_checksum, IndexOutcome, RetrievalError};
use serde::Deserialize;
use serde_json::json;

use super::{decision_request, resolve_target, PipelineContext, Target};
use crate::constants::messages;
use crate::state::{
    IndexState, IndexStatus, Insight, PipelineState, RetrievalResult, RetrievalState, StateUpdate,
};

const INSIGHT_SYSTEM: &str = "Summarize what the retrieved evidence says about the question. \
Use only the evidence. Return insight_summary and evidence_summary.";

#[derive(Debug, Deserialize)]
struct InsightPayload {
    insight_summary: String,
    #[serde(default)]
    evidence_summary: String,
}

impl StructuredOutput for InsightPayload {
    fn schema() -> JsonSchema {
        JsonSchema::new(
            "insight",
            json!({
                "type": "object",
                "properties": {
                    "insight_summary": {"type": "string"},
                    "evidence_summary": {"type": "string"}
                },
                "required": ["insight_summary", "evidence_summary"],
                "additionalProperties": false
            }),
        )
    }
}

/// Make sure the target source has a current index
pub async fn rag_index(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let status = match resolve_target(&ctx, &state).await {
        Target::None => IndexStatus::new(IndexState::NoSource, None),
        Target::Missing(id) => IndexStatus::new(IndexState::DatasetMissing, Some(id)),
        Target::Found(record) => {
            let outcome = match file_checksum(&record.storage_path).await {
                Ok(checksum) => {
                    ctx.retrieval
                        .index_source(&record.source_id, &record.storage_path, &checksum)
                        .await
                }
                Err(e) => Err(e),
            };
            let source_id = Some(record.source_id);
            match outcome {
                Ok(IndexOutcome::Unchanged) => IndexStatus::new(IndexState::Existing, source_id),
                Ok(IndexOutcome::Indexed { .. }) => {
                    IndexStatus::new(IndexState::Created, source_id)
                }
                Ok(IndexOutcome::Empty) => IndexStatus {
                    error: Some("The dataset has no text to index".to_string()),
                    ..IndexStatus::new(IndexState::Failed, source_id)
                },
                Err(e) => {
                    log::warn!("Indexing {:?} failed: {}", source_id, e);
                    IndexStatus {
                        error: Some(e.to_string()),
                        ..IndexStatus::new(IndexState::Failed, source_id)
                    }
                }
            }
        }
    };

    log::info!("Index status: {:?} for {:?}", status.status, status.source_id);
    Ok(StateUpdate::new().retrieval(RetrievalState {
        index_status: Some(status),
        ..Default::default()
    }))
}

/// Search the indexed source for chunks related to the question
pub async fn rag_retrieve(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let query = state.request.question.trim().to_string();
    let index_status = state.retrieval.index_status.as_ref();
    let source_id = index_status.and_then(|s| s.source_id.clone());

    let mut result = RetrievalResult {
        query: query.clone(),
        source_id: source_id.clone(),
        ..Default::default()
    };

    match (index_status, &source_id) {
        (Some(status), Some(id)) if status.is_searchable() && !query.is_empty() => {
            let scope = [id.clone()];
            match ctx.retrieval.query(&query, ctx.top_k, Some(scope.as_slice())).await {
                Ok(chunks) => {
                    result.context = build_context(&chunks);
                    result.count = chunks.len();
                    result.data_exists = !chunks.is_empty();
                    result.chunks = chunks;
                }
                Err(RetrievalError::NotIndexed) => {
                    result.error = Some(RetrievalError::NotIndexed.to_string());
                }
                Err(e) => {
                    log::warn!("Retrieval for '{}' failed: {}", id, e);
                    result.error = Some(e.to_string());
                }
            }
        }
        _ => log::debug!("Nothing searchable for this question"),
    }

    Ok(StateUpdate::new().retrieval(RetrievalState {
        result: Some(result),
        ..Default::default()
    }))
}

/// Condense retrieved chunks into a short insight
pub async fn insight_synthesis(
    ctx: Arc<PipelineContext>,
    state: PipelineState,
) -> node_engine::Result<StateUpdate> {
    let result = state.retrieval.result.clone().unwrap_or_default();

    let insight = if !result.data_exists {
        Insight {
            summary: messages::NO_EVIDENCE.to_string(),
            evidence_summary: String::new(),
            retrieved_count: 0,
            source_id: result.source_id,
        }
    } else {
        let prompt = format!(
            "question={}\nevidence=\n{}",
            state.request.question.trim(),
            result.context
        );
        let request = decision_request(&state, INSIGHT_SYSTEM, prompt);
        match complete_structured::<InsightPayload>(ctx.structured.as_ref(), &request).await {
            Ok(payload) => Insight {
                summary: payload.insight_summary,
                evidence_summary: payload.evidence_summary,
                retrieved_count: result.count,
                source_id: result.source_id,
            },
            Err(e) => {
                log::warn!("Insight synthesis failed: {}", e);
                Insight {
                    summary: format!(
                        "Found {} related passages in the dataset.",
                        result.count
                    ),
                    evidence_summary: String::new(),
                    retrieved_count: result.count,
                    source_id: result.source_id,
                }
            }
        }
    };

    Ok(StateUpdate::new().retrieval(RetrievalState {
        insight: Some(insight),
        ..Default::default()
    }))
}
