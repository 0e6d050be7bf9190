//! HTTP/WS wiring for spec §6. Handlers stay thin: parse the request into a
//! domain type, hand it to the [`Orchestrator`](crate::orchestrator::Orchestrator)
//! or the store, shape the reply. `AppState`/`build_router` follow the
//! shared-state-behind-an-`Arc`, router-builder-function split the sibling
//! MCP server in this pack's retrieval set uses for its own Axum surface.

mod error;
mod handlers;
mod stream;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::batch::BatchRegistry;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::store::ResultStore;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn ResultStore>,
    pub batches: Arc<BatchRegistry>,
    pub config: Config,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/probe/file", post(handlers::probe_file))
        .route("/probe/url", post(handlers::probe_url))
        .route("/probe/hls", post(handlers::probe_hls))
        .route("/probe/compare", post(handlers::probe_compare))
        .route("/probe/status/{id}", get(handlers::job_status))
        .route("/probe/analyses", get(handlers::list_analyses))
        .route("/probe/analyses/{id}", delete(handlers::delete_analysis))
        .route("/batch/analyze", post(handlers::submit_batch))
        .route("/batch/status/{id}", get(handlers::batch_status))
        .route("/batch/{id}/cancel", post(handlers::cancel_batch))
        .route("/stream/progress/{id}", get(stream::progress_sse))
        .route("/stream/analysis", get(stream::analysis_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
