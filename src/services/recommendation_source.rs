use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::{CacheKey, CacheNamespace, TtlCache},
    error::AppResult,
    models::{DegradedReason, RecommendationCandidate, SourceOutcome},
    services::providers::{InsightsEngine, InsightsQuery},
};

/// Cache-backed client for the insights engine
///
/// Upstream errors and timeouts never escape: they become
/// [`SourceOutcome::Degraded`] so the pipeline can fall back to entity search alone.
#[derive(Clone)]
pub struct RecommendationSourceClient {
    engine: Arc<dyn InsightsEngine>,
    cache: TtlCache,
    ttl: Duration,
    timeout: Duration,
}

impl RecommendationSourceClient {
    pub fn new(
        engine: Arc<dyn InsightsEngine>,
        cache: TtlCache,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            cache,
            ttl,
            timeout,
        }
    }

    /// Queries the engine, or the cache when the same parameter bag was seen recently
    ///
    /// Returns `Err` only for invalid location parameters, before any upstream call.
    pub async fn fetch(&self, query: &InsightsQuery) -> AppResult<SourceOutcome> {
        query.validate()?;

        let key = CacheKey::new(CacheNamespace::QlooRecommendations, &[json!(query)]);
        if let Some(cached) = self.cache.get::<Vec<RecommendationCandidate>>(&key) {
            tracing::debug!(results = cached.len(), "Insights served from cache");
            return Ok(SourceOutcome::Success(cached));
        }

        let outcome = match tokio::time::timeout(self.timeout, self.engine.recommend(query)).await {
            Ok(Ok(candidates)) => {
                if !self.cache.set(&key, &candidates, Some(self.ttl)) {
                    tracing::warn!(key = %key, "Cache write failed, continuing uncached");
                }
                SourceOutcome::Success(candidates)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    category = %query.category,
                    "Insights engine failed, degrading to entity search results"
                );
                SourceOutcome::degraded(DegradedReason::Upstream(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    category = %query.category,
                    "Insights engine timed out, degrading to entity search results"
                );
                SourceOutcome::degraded(DegradedReason::Timeout(self.timeout))
            }
        };

        Ok(outcome)
    }
}
