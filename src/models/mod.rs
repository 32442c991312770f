use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::time::Duration;

pub mod qloo;

/// Lower-cases a semantic category and strips all whitespace, e.g. `"Place "` → `"place"`
pub fn normalize_category(category: &str) -> String {
    category
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Geographic coordinates attached to engine results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A named entity resolved against the search index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEntity {
    pub entity_id: String,
    pub name: String,
    pub subtype: String,
    pub location: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Output of the entity resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEntities {
    /// De-duplicated identifiers in first-seen order
    pub entity_ids: Vec<String>,
    /// Every match, in resolution order
    pub entity_details: Vec<ResolvedEntity>,
}

/// Where a candidate came from. Never used for ranking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Engine,
    EntitySearch,
}

/// A single recommendation candidate returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationCandidate {
    pub entity_id: String,
    pub name: String,
    pub subtype: String,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub popularity: Option<f64>,
    pub source: CandidateSource,
}

impl From<ResolvedEntity> for RecommendationCandidate {
    fn from(entity: ResolvedEntity) -> Self {
        let mut properties = entity.properties;
        // The resolver only knows a textual location; keep it visible to the caller
        if let Some(location) = entity.location {
            properties
                .entry("address".to_string())
                .or_insert(Value::String(location));
        }

        Self {
            entity_id: entity.entity_id,
            name: entity.name,
            subtype: entity.subtype,
            location: None,
            properties,
            popularity: None,
            source: CandidateSource::EntitySearch,
        }
    }
}

/// Entities and location extracted from a taste description
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub category: String,
    pub entity_names: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub location_array: Option<Vec<String>>,
}

/// Input handed to the entity/location extractor
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractionRequest {
    pub taste: String,
    pub similar_tastes: Vec<String>,
}

/// Why the insights engine produced no usable output
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradedReason {
    Upstream(String),
    Timeout(#[serde(with = "duration_millis")] Duration),
}

impl Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::Upstream(msg) => write!(f, "upstream error: {}", msg),
            DegradedReason::Timeout(after) => {
                write!(f, "upstream timed out after {}ms", after.as_millis())
            }
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

/// Result of querying the insights engine
///
/// Fatal conditions travel on the `Err` side of `AppResult`; everything else is
/// either a clean result or a degraded one.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Success(Vec<RecommendationCandidate>),
    Degraded {
        candidates: Vec<RecommendationCandidate>,
        reason: DegradedReason,
    },
}

impl SourceOutcome {
    pub fn degraded(reason: DegradedReason) -> Self {
        SourceOutcome::Degraded {
            candidates: Vec::new(),
            reason,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, SourceOutcome::Success(_))
    }

    pub fn candidates(&self) -> &[RecommendationCandidate] {
        match self {
            SourceOutcome::Success(candidates) => candidates,
            SourceOutcome::Degraded { candidates, .. } => candidates,
        }
    }
}

/// Merged, de-duplicated candidate set with provenance statistics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregationResult {
    pub candidates: Vec<RecommendationCandidate>,
    pub total_from_engine: usize,
    pub total_from_entity_search: usize,
    pub unique_added_from_entity_search: usize,
    pub engine_succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<DegradedReason>,
}

/// Narration returned by the explanation generator
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Explanation {
    /// A JSON object carrying a `recommendations` array aligned with the candidates
    Structured(Value),
    /// Model output that did not parse, passed through unmodified
    Raw(String),
}

/// Request for the full recommendation flow
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub taste: String,
    #[serde(default)]
    pub similar_tastes: Vec<String>,
    /// Skips the extractor when the caller already has entities
    #[serde(default)]
    pub extraction: Option<Extraction>,
    #[serde(default)]
    pub signal_weight: Option<u32>,
}

/// Request for the aggregation contract alone
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateRequest {
    pub taste: String,
    #[serde(default)]
    pub similar_tastes: Vec<String>,
    pub extraction: Extraction,
    #[serde(default)]
    pub signal_weight: Option<u32>,
}

/// Provenance and coverage counters reported alongside recommendations
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationStats {
    pub total_from_engine: usize,
    pub total_from_entity_search: usize,
    pub unique_added_from_entity_search: usize,
    pub engine_succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<DegradedReason>,
}

/// Response for the full recommendation flow
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationCandidate>,
    /// `None` when the explanation generator failed
    pub explanation: Option<Explanation>,
    pub extraction: Extraction,
    pub stats: RecommendationStats,
    pub generated_at: DateTime<Utc>,
}

impl AggregationResult {
    /// Splits the result into its candidates and its counters
    pub fn into_parts(self) -> (Vec<RecommendationCandidate>, RecommendationStats) {
        let stats = RecommendationStats {
            total_from_engine: self.total_from_engine,
            total_from_entity_search: self.total_from_entity_search,
            unique_added_from_entity_search: self.unique_added_from_entity_search,
            engine_succeeded: self.engine_succeeded,
            degraded_reason: self.degraded_reason,
        };
        (self.candidates, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Place"), "place");
        assert_eq!(normalize_category(" TV Show "), "tvshow");
        assert_eq!(normalize_category("artist"), "artist");
    }

    #[test]
    fn test_candidate_source_serialization() {
        assert_eq!(
            serde_json::to_string(&CandidateSource::Engine).unwrap(),
            "\"engine\""
        );
        assert_eq!(
            serde_json::to_string(&CandidateSource::EntitySearch).unwrap(),
            "\"entity_search\""
        );
    }

    #[test]
    fn test_resolved_entity_to_candidate() {
        let entity = ResolvedEntity {
            entity_id: "e1".to_string(),
            name: "Sushi Dai".to_string(),
            subtype: "urn:entity:place".to_string(),
            location: Some("Tsukiji, Tokyo".to_string()),
            properties: Map::new(),
        };

        let candidate = RecommendationCandidate::from(entity);
        assert_eq!(candidate.entity_id, "e1");
        assert_eq!(candidate.source, CandidateSource::EntitySearch);
        assert_eq!(candidate.location, None);
        assert_eq!(candidate.properties["address"], json!("Tsukiji, Tokyo"));
    }

    #[test]
    fn test_resolved_entity_keeps_existing_address() {
        let mut properties = Map::new();
        properties.insert("address".to_string(), json!("1-2-3 Chuo"));
        let entity = ResolvedEntity {
            entity_id: "e1".to_string(),
            name: "Sushi Dai".to_string(),
            subtype: "place".to_string(),
            location: Some("Tokyo".to_string()),
            properties,
        };

        let candidate = RecommendationCandidate::from(entity);
        assert_eq!(candidate.properties["address"], json!("1-2-3 Chuo"));
    }

    #[test]
    fn test_extraction_deserialization_defaults() {
        let extraction: Extraction =
            serde_json::from_str(r#"{"category":"place","entity_names":["Sushi"]}"#).unwrap();
        assert_eq!(extraction.location, None);
        assert_eq!(extraction.location_array, None);
    }

    #[test]
    fn test_degraded_reason_serialization() {
        let reason = DegradedReason::Timeout(Duration::from_millis(1500));
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            json!({"kind": "timeout", "detail": 1500})
        );
        assert_eq!(reason.to_string(), "upstream timed out after 1500ms");
    }

    #[test]
    fn test_source_outcome_accessors() {
        let outcome = SourceOutcome::degraded(DegradedReason::Upstream("503".to_string()));
        assert!(!outcome.succeeded());
        assert!(outcome.candidates().is_empty());
        assert!(SourceOutcome::Success(vec![]).succeeded());
    }
}
