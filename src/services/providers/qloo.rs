//! Qloo API provider
//!
//! Backs both upstream sources of the aggregation pipeline:
//! 1. Entity search: GET /search → concrete entity IDs for a name
//! 2. Insights: POST /v2/insights → ranked entities biased by signal entities
//!
//! Caching is layered on top by the entity resolver and the recommendation source
//! client, so every call here goes to the network.
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{
        qloo::{QlooInsightsResponse, QlooSearchResponse},
        RecommendationCandidate, ResolvedEntity,
    },
    services::providers::{EntityQuery, EntitySearchIndex, InsightsEngine, InsightsQuery},
};

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Clone)]
pub struct QlooClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl QlooClient {
    /// Creates a client whose every request is bounded by `timeout`
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_success(response: reqwest::Response) -> AppResult<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Qloo API returned status {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

/// Maps a normalized category to Qloo's entity type URN
fn entity_type_urn(category: &str) -> String {
    if category.starts_with("urn:") {
        category.to_string()
    } else {
        format!("urn:entity:{}", category)
    }
}

/// JSON body for the insights endpoint
fn insights_body(query: &InsightsQuery) -> Value {
    let signals: Vec<Value> = query
        .signal_entities
        .iter()
        .map(|id| json!({ "entity": id, "weight": query.signal_weight }))
        .collect();

    let mut body = json!({
        "filter.type": entity_type_urn(&query.category),
        "signal.interests.entities": signals,
        "take": query.take,
    });

    if let Some(location) = &query.location {
        body["filter.location.query"] = json!(location);
    } else if let Some(locations) = &query.location_array {
        body["filter.location.query"] = json!(locations);
    }

    body
}

/// Decodes an insights response body into engine-tagged candidates
fn parse_insights(body: &str) -> AppResult<Vec<RecommendationCandidate>> {
    let insights: QlooInsightsResponse = serde_json::from_str(body)?;
    if !insights.success {
        return Err(AppError::ExternalApi(
            "Qloo insights request reported failure".to_string(),
        ));
    }

    Ok(insights
        .into_entities()
        .into_iter()
        .map(RecommendationCandidate::from)
        .collect())
}

#[async_trait::async_trait]
impl EntitySearchIndex for QlooClient {
    async fn search(&self, query: &EntityQuery) -> AppResult<Vec<ResolvedEntity>> {
        let url = format!("{}/search", self.api_url);
        let types = entity_type_urn(&query.category);

        let mut params = vec![("query", query.name.as_str()), ("types", types.as_str())];
        if let Some(location) = &query.location {
            params.push(("filter.location.query", location.as_str()));
        }

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&params)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let search: QlooSearchResponse = response.json().await?;
        let entities: Vec<ResolvedEntity> =
            search.results.into_iter().map(ResolvedEntity::from).collect();

        tracing::info!(
            name = %query.name,
            category = %query.category,
            results = entities.len(),
            provider = "qloo",
            "Entity search completed"
        );

        Ok(entities)
    }
}

#[async_trait::async_trait]
impl InsightsEngine for QlooClient {
    async fn recommend(&self, query: &InsightsQuery) -> AppResult<Vec<RecommendationCandidate>> {
        let url = format!("{}/v2/insights", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&insights_body(query))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let response_text = response.text().await?;
        tracing::debug!(response = %response_text, "Raw Qloo insights response");

        let candidates = parse_insights(&response_text)?;

        tracing::info!(
            category = %query.category,
            signals = query.signal_entities.len(),
            results = candidates.len(),
            provider = "qloo",
            "Insights fetched"
        );

        Ok(candidates)
    }
}
