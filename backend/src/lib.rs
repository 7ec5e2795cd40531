pub mod analysis;
pub mod auth;
pub mod config;
pub mod database;
pub mod day_split;
pub mod elevation;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod ingest;
pub mod rate_limit;
pub mod simplify;
pub mod storage;
pub mod track_parser;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::ingest::IngestService;

/// Room for multipart boundaries and the small text fields next to the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.ingest.settings().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/track-files", post(handlers::upload_track_file))
        .route("/api/track-files/:owner_id", get(handlers::get_track_file))
        .route("/api/day-splits", post(handlers::day_splits))
        .route("/api/simplify", post(handlers::simplify))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
