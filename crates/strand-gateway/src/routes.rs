use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use strand_core::error::StrandError;
use strand_core::graph::GraphDefinition;
use strand_core::types::{self, GraphId, RunId};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// POST /graph/create
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    Json(def): Json<GraphDefinition>,
) -> ApiResult<Json<serde_json::Value>> {
    let graph_id = state.service.create_graph(def)?;
    Ok(Json(serde_json::json!({ "graph_id": graph_id })))
}

// GET /graph/{graph_id}
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let graph = state.service.get_graph(&GraphId::from_string(&id))?;
    let def = graph.to_definition();
    Ok(Json(serde_json::json!({
        "graph_id": graph.id,
        "nodes": def.nodes,
        "edges": def.edges,
        "start_node": def.start_node,
        "created_at": graph.created_at,
    })))
}

// GET /graph/sample_id
pub async fn sample_id(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let id = state
        .sample_graph_id
        .as_ref()
        .ok_or_else(|| StrandError::UnknownGraph("sample".into()))?;
    Ok(Json(serde_json::json!({ "graph_id": id })))
}

#[derive(Deserialize)]
pub struct RunGraphBody {
    pub graph_id: String,
    #[serde(default)]
    pub initial_state: types::State,
    /// Return immediately with the run id instead of waiting for the result.
    #[serde(default)]
    pub background: bool,
}

// POST /graph/run
pub async fn run_graph(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunGraphBody>,
) -> ApiResult<Response> {
    let graph_id = GraphId::from_string(&body.graph_id);

    if body.background {
        let (run_id, _handle) = state.service.start_run(&graph_id, body.initial_state)?;
        info!(run_id = %run_id, graph_id = %graph_id, "Run started in background");
        let accepted = Json(serde_json::json!({ "run_id": run_id, "status": "pending" }));
        return Ok((StatusCode::ACCEPTED, accepted).into_response());
    }

    let run = state.service.run_graph(&graph_id, body.initial_state).await?;
    let mut response = serde_json::json!({
        "run_id": run.id,
        "status": run.status,
        "final_state": run.state,
        "log": run.log,
    });
    if let Some(ref failure) = run.error {
        response["error"] = serde_json::to_value(failure).map_err(StrandError::from)?;
    }
    Ok(Json(response).into_response())
}

// GET /graph/state/{run_id}
pub async fn run_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<strand_core::run::Run>> {
    let run = state.service.get_run(&RunId::from_string(&id))?;
    Ok(Json(run))
}
