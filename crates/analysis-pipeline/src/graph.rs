//! Pipeline graph assembly

use std::future::Future;
use std::sync::Arc;

use node_engine::{
    node_fn, CompiledGraph, EventSink, GraphBuilder, GraphNode, LogEventSink, END, START,
};

use crate::constants::{defaults, nodes};
use crate::nodes::{answer, intake, preprocess, rag, visualization, PipelineContext};
use crate::routing::{
    route_after_decision, route_after_intake, route_after_retrieval, route_after_visualization,
    AfterRetrieval, AfterVisualization, IntakeRoute, PreprocessRoute,
};
use crate::state::{PipelineState, StateUpdate};

/// Bind a node function to the shared context
fn stage<F, Fut>(ctx: &Arc<PipelineContext>, f: F) -> impl GraphNode<PipelineState> + 'static
where
    F: Fn(Arc<PipelineContext>, PipelineState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = node_engine::Result<StateUpdate>> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    node_fn(move |state: PipelineState| f(Arc::clone(&ctx), state))
}

/// Build the analysis graph, logging workflow events
pub fn build_pipeline_graph(
    ctx: Arc<PipelineContext>,
) -> node_engine::Result<CompiledGraph<PipelineState>> {
    build_pipeline_graph_with_sink(ctx, Arc::new(LogEventSink))
}

/// Build the analysis graph with a custom event sink
///
/// ```text
/// intake ─┬─ general_answer
///         └─ dataset_profile ─ preprocess_decision ─┬─ preprocess_planner ─ preprocess_executor ─┐
///                                                   └─ preprocess_skip ──────────────────────────┤
///    ┌───────────────────────────────────────────────────────────────────────────────────────────┘
///    └─ rag_index ─ rag_retrieve ─ insight_synthesis ─┬─ visualization_planner ─ visualization_executor ─┬─ report_composer
///                                                     ├─ report_composer                                 └─ data_answer
///                                                     └─ data_answer
/// ```
pub fn build_pipeline_graph_with_sink(
    ctx: Arc<PipelineContext>,
    sink: Arc<dyn EventSink>,
) -> node_engine::Result<CompiledGraph<PipelineState>> {
    GraphBuilder::new(defaults::GRAPH_NAME)
        .add_node(nodes::INTAKE, stage(&ctx, intake::intake))
        .add_node(nodes::GENERAL_ANSWER, stage(&ctx, intake::general_answer))
        .add_node(nodes::DATASET_PROFILE, stage(&ctx, preprocess::dataset_profile))
        .add_node(nodes::PREPROCESS_DECISION, stage(&ctx, preprocess::preprocess_decision))
        .add_node(nodes::PREPROCESS_PLANNER, stage(&ctx, preprocess::preprocess_planner))
        .add_node(nodes::PREPROCESS_EXECUTOR, stage(&ctx, preprocess::preprocess_executor))
        .add_node(nodes::PREPROCESS_SKIP, stage(&ctx, preprocess::preprocess_skip))
        .add_node(nodes::RAG_INDEX, stage(&ctx, rag::rag_index))
        .add_node(nodes::RAG_RETRIEVE, stage(&ctx, rag::rag_retrieve))
        .add_node(nodes::INSIGHT_SYNTHESIS, stage(&ctx, rag::insight_synthesis))
        .add_node(
            nodes::VISUALIZATION_PLANNER,
            stage(&ctx, visualization::visualization_planner),
        )
        .add_node(
            nodes::VISUALIZATION_EXECUTOR,
            stage(&ctx, visualization::visualization_executor),
        )
        .add_node(nodes::REPORT_COMPOSER, stage(&ctx, answer::report_composer))
        .add_node(nodes::DATA_ANSWER, stage(&ctx, answer::data_answer))
        .add_edge(START, nodes::INTAKE)
        .add_conditional_edges(
            nodes::INTAKE,
            route_after_intake,
            [
                (IntakeRoute::GeneralQuestion, nodes::GENERAL_ANSWER),
                (IntakeRoute::DataPipeline, nodes::DATASET_PROFILE),
            ],
        )
        .add_edge(nodes::GENERAL_ANSWER, END)
        .add_edge(nodes::DATASET_PROFILE, nodes::PREPROCESS_DECISION)
        .add_conditional_edges(
            nodes::PREPROCESS_DECISION,
            route_after_decision,
            [
                (PreprocessRoute::Run, nodes::PREPROCESS_PLANNER),
                (PreprocessRoute::Skip, nodes::PREPROCESS_SKIP),
            ],
        )
        .add_edge(nodes::PREPROCESS_PLANNER, nodes::PREPROCESS_EXECUTOR)
        .add_edge(nodes::PREPROCESS_EXECUTOR, nodes::RAG_INDEX)
        .add_edge(nodes::PREPROCESS_SKIP, nodes::RAG_INDEX)
        .add_edge(nodes::RAG_INDEX, nodes::RAG_RETRIEVE)
        .add_edge(nodes::RAG_RETRIEVE, nodes::INSIGHT_SYNTHESIS)
        .add_conditional_edges(
            nodes::INSIGHT_SYNTHESIS,
            route_after_retrieval,
            [
                (AfterRetrieval::Visualization, nodes::VISUALIZATION_PLANNER),
                (AfterRetrieval::Report, nodes::REPORT_COMPOSER),
                (AfterRetrieval::DataAnswer, nodes::DATA_ANSWER),
            ],
        )
        .add_edge(nodes::VISUALIZATION_PLANNER, nodes::VISUALIZATION_EXECUTOR)
        .add_conditional_edges(
            nodes::VISUALIZATION_EXECUTOR,
            route_after_visualization,
            [
                (AfterVisualization::Report, nodes::REPORT_COMPOSER),
                (AfterVisualization::DataAnswer, nodes::DATA_ANSWER),
            ],
        )
        .add_edge(nodes::REPORT_COMPOSER, END)
        .add_edge(nodes::DATA_ANSWER, END)
        .with_event_sink(sink)
        .compile()
}
