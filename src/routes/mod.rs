use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    cache::TtlCache,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::RecommendationService,
};

pub mod cache;
pub mod recommendations;

/// Shared state handed to every handler
pub struct AppState {
    pub service: RecommendationService,
    pub cache: TtlCache,
}

impl AppState {
    pub fn new(service: RecommendationService) -> Self {
        let cache = service.cache().clone();
        Self { service, cache }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(Arc::new(state))
        .layer(
            // Outermost first: the request ID must exist before the trace span is made
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route("/aggregate", post(recommendations::aggregate))
        .route("/cache/stats", get(cache::stats))
        .route("/cache", delete(cache::clear))
        .route("/cache/:key", delete(cache::delete_key))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
