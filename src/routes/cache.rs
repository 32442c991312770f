use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    cache::{CacheKey, CacheStats},
    routes::AppState,
};

/// Entry count, sorted keys, memory estimate and hit/miss counters
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

pub async fn clear(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.cache.clear();
    Json(json!({ "cleared": cleared }))
}

/// Evicts one entry by its full key, e.g. `entity_resolution|["Sushi"]|"place"|null`
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<Value> {
    let deleted = state.cache.delete(&CacheKey::raw(key.as_str()));
    tracing::info!(key = %key, deleted, "Cache entry delete requested");
    Json(json!({ "key": key, "deleted": deleted }))
}
