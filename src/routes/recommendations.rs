use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{AggregateRequest, AggregationResult, RecommendationRequest, RecommendationResponse},
    routes::AppState,
};

/// Handler for the full recommendation flow
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    tracing::info!(
        request_id = %request_id,
        similar_tastes = request.similar_tastes.len(),
        extraction_supplied = request.extraction.is_some(),
        "Processing recommendation request"
    );

    let response = state.service.recommend(request).await?;

    tracing::info!(
        request_id = %request_id,
        recommendations = response.recommendations.len(),
        engine_succeeded = response.stats.engine_succeeded,
        explained = response.explanation.is_some(),
        "Recommendations completed"
    );

    Ok(Json(response))
}

/// Handler for aggregation alone, with a caller-supplied extraction
pub async fn aggregate(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<AggregateRequest>,
) -> AppResult<Json<AggregationResult>> {
    tracing::info!(
        request_id = %request_id,
        category = %request.extraction.category,
        entity_names = request.extraction.entity_names.len(),
        "Processing aggregation request"
    );

    let result = state
        .service
        .aggregate(
            &request.taste,
            &request.similar_tastes,
            &request.extraction,
            request.signal_weight,
        )
        .await?;

    tracing::info!(
        request_id = %request_id,
        candidates = result.candidates.len(),
        "Aggregation completed"
    );

    Ok(Json(result))
}
