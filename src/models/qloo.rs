// ============================================================================
// Qloo API Types
// ============================================================================

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{CandidateSource, GeoPoint, RecommendationCandidate, ResolvedEntity};

/// Entity record shared by the search and insights endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct QlooEntity {
    pub entity_id: String,
    pub name: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub location: Option<QlooLocation>,
    #[serde(default)]
    pub disambiguation: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QlooLocation {
    pub lat: f64,
    pub lon: f64,
}

impl QlooEntity {
    fn resolved_subtype(&self) -> String {
        self.subtype
            .clone()
            .or_else(|| self.types.first().cloned())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Human-readable location: the address property, falling back to the disambiguation
    fn textual_location(&self) -> Option<String> {
        self.properties
            .get("address")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.disambiguation.clone())
    }
}

impl From<QlooEntity> for ResolvedEntity {
    fn from(entity: QlooEntity) -> Self {
        ResolvedEntity {
            subtype: entity.resolved_subtype(),
            location: entity.textual_location(),
            entity_id: entity.entity_id,
            name: entity.name,
            properties: entity.properties,
        }
    }
}

impl From<QlooEntity> for RecommendationCandidate {
    fn from(entity: QlooEntity) -> Self {
        RecommendationCandidate {
            subtype: entity.resolved_subtype(),
            location: entity.location.map(|l| GeoPoint {
                lat: l.lat,
                lon: l.lon,
            }),
            entity_id: entity.entity_id,
            name: entity.name,
            properties: entity.properties,
            popularity: entity.popularity,
            source: CandidateSource::Engine,
        }
    }
}

/// Response from GET /search
#[derive(Debug, Deserialize)]
pub struct QlooSearchResponse {
    #[serde(default)]
    pub results: Vec<QlooEntity>,
}

/// Response from GET /v2/insights
#[derive(Debug, Deserialize)]
pub struct QlooInsightsResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub results: Option<QlooInsightsResults>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QlooInsightsResults {
    #[serde(default)]
    pub entities: Vec<QlooEntity>,
}

impl QlooInsightsResponse {
    /// Ranked entities, empty when the engine reports no matches
    pub fn into_entities(self) -> Vec<QlooEntity> {
        self.results.map(|r| r.entities).unwrap_or_default()
    }
}
