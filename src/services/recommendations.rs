use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    cache::{CacheKey, CacheNamespace, TtlCache},
    cached,
    config::EngineSettings,
    error::{AppError, AppResult},
    models::{
        normalize_category, AggregationResult, Extraction, ExtractionRequest,
        RecommendationRequest, RecommendationResponse,
    },
    services::{
        aggregator::merge_candidates,
        entity_resolver::EntityResolver,
        explanation::{build_explanation_prompt, parse_explanation},
        providers::{
            validate_location, EntityExtractor, EntitySearchIndex, ExplanationGenerator,
            InsightsEngine, InsightsQuery,
        },
        recommendation_source::RecommendationSourceClient,
    },
};

/// Upstream collaborators the service is built from
pub struct Collaborators {
    pub extractor: Arc<dyn EntityExtractor>,
    pub search_index: Arc<dyn EntitySearchIndex>,
    pub insights_engine: Arc<dyn InsightsEngine>,
    pub explainer: Arc<dyn ExplanationGenerator>,
}

/// Turns a taste description into ranked, explained recommendations
///
/// Flow: extraction (unless supplied) → entity resolution → insights engine with the
/// resolved IDs as signals → merge → explanation. Every upstream call except the
/// explanation goes through the shared [`TtlCache`].
#[derive(Clone)]
pub struct RecommendationService {
    extractor: Arc<dyn EntityExtractor>,
    explainer: Arc<dyn ExplanationGenerator>,
    resolver: EntityResolver,
    source: RecommendationSourceClient,
    cache: TtlCache,
    settings: EngineSettings,
}

impl RecommendationService {
    pub fn new(collaborators: Collaborators, cache: TtlCache, settings: EngineSettings) -> Self {
        let resolver = EntityResolver::new(
            collaborators.search_index,
            cache.clone(),
            settings.entity_ttl,
        );
        let source = RecommendationSourceClient::new(
            collaborators.insights_engine,
            cache.clone(),
            settings.recommendation_ttl,
            settings.upstream_timeout,
        );

        Self {
            extractor: collaborators.extractor,
            explainer: collaborators.explainer,
            resolver,
            source,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Resolves the extraction's entities, queries the insights engine with them as
    /// signals and merges both result sets
    ///
    /// Fails only with [`AppError::NoEntitiesResolved`] or
    /// [`AppError::InvalidLocationParameters`]; insights engine failures degrade to
    /// the entity search results and are reported in the returned counters.
    #[instrument(skip_all, fields(category = %extraction.category, taste_len = taste.len()))]
    pub async fn aggregate(
        &self,
        taste: &str,
        similar_tastes: &[String],
        extraction: &Extraction,
        signal_weight: Option<u32>,
    ) -> AppResult<AggregationResult> {
        validate_location(
            extraction.location.as_deref(),
            extraction.location_array.as_deref(),
        )?;

        let category = normalize_category(&extraction.category);
        if category.is_empty() {
            return Err(AppError::InvalidInput("Category cannot be empty".to_string()));
        }

        tracing::debug!(
            similar_tastes = similar_tastes.len(),
            entity_names = ?extraction.entity_names,
            "Aggregating recommendations"
        );

        let resolved = self
            .resolver
            .resolve(
                &extraction.entity_names,
                &category,
                extraction.location.as_deref(),
            )
            .await?;

        let query = InsightsQuery {
            take: self.settings.result_cap_for(&category),
            category,
            signal_entities: resolved.entity_ids,
            signal_weight: signal_weight.unwrap_or(self.settings.signal_weight),
            location: extraction.location.clone(),
            location_array: extraction.location_array.clone(),
        };
        let outcome = self.source.fetch(&query).await?;

        Ok(merge_candidates(outcome, resolved.entity_details))
    }

    /// Full flow: extract if needed, aggregate, then explain
    pub async fn recommend(&self, request: RecommendationRequest) -> AppResult<RecommendationResponse> {
        let taste = request.taste.trim();
        if taste.is_empty() {
            return Err(AppError::InvalidInput("Taste cannot be empty".to_string()));
        }

        let extraction = match request.extraction {
            Some(extraction) => extraction,
            None => self.extract(taste, &request.similar_tastes).await?,
        };

        let result = self
            .aggregate(taste, &request.similar_tastes, &extraction, request.signal_weight)
            .await?;

        let category = normalize_category(&extraction.category);
        let prompt = build_explanation_prompt(taste, &request.similar_tastes, &result.candidates, &category);
        let explanation = match self.explainer.generate(&prompt).await {
            Ok(text) => Some(parse_explanation(&text)),
            Err(e) => {
                tracing::warn!(error = %e, "Explanation generation failed, returning recommendations without it");
                None
            }
        };

        let (recommendations, stats) = result.into_parts();
        Ok(RecommendationResponse {
            recommendations,
            explanation,
            extraction,
            stats,
            generated_at: Utc::now(),
        })
    }

    async fn extract(&self, taste: &str, similar_tastes: &[String]) -> AppResult<Extraction> {
        let request = ExtractionRequest {
            taste: taste.to_string(),
            similar_tastes: similar_tastes.to_vec(),
        };
        let key = CacheKey::new(CacheNamespace::LlmExtraction, &[json!(request)]);

        cached!(self.cache, key, Some(self.settings.extraction_ttl), async {
            self.extractor.extract(&request).await
        })
    }
}
