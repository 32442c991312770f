//! Upstream collaborator abstraction
//!
//! The aggregation pipeline only talks to these traits. Concrete HTTP clients live in
//! the submodules: [`qloo`] backs both the search index and the insights engine, and
//! [`llm`] backs extraction and explanation over an OpenAI-compatible API.
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{Extraction, ExtractionRequest, RecommendationCandidate, ResolvedEntity},
};

pub mod llm;
pub mod qloo;

/// A single name lookup against the search index
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntityQuery {
    pub name: String,
    /// Normalized category, e.g. `place`
    pub category: String,
    pub location: Option<String>,
}

/// Parameter bag for the insights engine
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InsightsQuery {
    pub category: String,
    pub signal_entities: Vec<String>,
    /// Shared by every signal entity
    pub signal_weight: u32,
    pub location: Option<String>,
    /// Multi-region expansion; exclusive with `location`
    pub location_array: Option<Vec<String>>,
    pub take: usize,
}

impl InsightsQuery {
    /// Rejects parameter combinations the engine would refuse
    pub fn validate(&self) -> AppResult<()> {
        validate_location(self.location.as_deref(), self.location_array.as_deref())
    }
}

/// A single location and a location array are mutually exclusive
pub fn validate_location(location: Option<&str>, location_array: Option<&[String]>) -> AppResult<()> {
    if location.is_some() && location_array.is_some() {
        return Err(AppError::InvalidLocationParameters(
            "location and location_array cannot both be set".to_string(),
        ));
    }
    Ok(())
}

/// Extracts a category, entity names and location from a taste description
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> AppResult<Extraction>;
}

/// Resolves a name to zero or more concrete entities
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EntitySearchIndex: Send + Sync {
    async fn search(&self, query: &EntityQuery) -> AppResult<Vec<ResolvedEntity>>;
}

/// Ranked recommendations biased by signal entities
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InsightsEngine: Send + Sync {
    /// Returns an empty list when the engine reports no matches
    async fn recommend(&self, query: &InsightsQuery) -> AppResult<Vec<RecommendationCandidate>>;
}

/// Narrates a result set from a prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExplanationGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}
