use strand_core::types::GraphId;
use strand_engine::WorkflowService;

/// Shared application state for axum handlers.
pub struct AppState {
    pub service: WorkflowService,
    /// Graph registered at startup, if any.
    pub sample_graph_id: Option<GraphId>,
}
