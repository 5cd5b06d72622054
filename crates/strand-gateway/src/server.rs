use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use strand_core::config::GatewayConfig;
use strand_core::types::GraphId;
use strand_engine::WorkflowService;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    service: WorkflowService,
    sample_graph_id: Option<GraphId>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        service: WorkflowService,
        sample_graph_id: Option<GraphId>,
    ) -> Self {
        Self {
            config,
            service,
            sample_graph_id,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            service: self.service.clone(),
            sample_graph_id: self.sample_graph_id.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

/// All gateway routes over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/graph/create", post(routes::create_graph))
        .route("/graph/run", post(routes::run_graph))
        .route("/graph/sample_id", get(routes::sample_id))
        .route("/graph/state/{run_id}", get(routes::run_state))
        .route("/graph/{graph_id}", get(routes::get_graph))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
