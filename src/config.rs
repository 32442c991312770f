use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CacheNamespace;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Qloo API key
    pub qloo_api_key: String,

    /// Qloo API base URL
    #[serde(default = "default_qloo_api_url")]
    pub qloo_api_url: String,

    /// API key for the OpenAI-compatible chat completions endpoint
    pub llm_api_key: String,

    /// Chat completions base URL
    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,

    /// Model used for extraction and explanations
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Timeout applied to every upstream HTTP call, in milliseconds
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Weight given to every signal entity sent to the insights engine
    #[serde(default = "default_signal_weight")]
    pub signal_weight: u32,

    /// Default number of results requested from the insights engine
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,

    /// Per-category result caps, e.g. `place=30,restaurant=30`
    #[serde(default)]
    pub result_cap_overrides: String,

    #[serde(default = "default_recommendation_cache_ttl_secs")]
    pub recommendation_cache_ttl_secs: u64,

    #[serde(default = "default_entity_cache_ttl_secs")]
    pub entity_cache_ttl_secs: u64,

    #[serde(default = "default_extraction_cache_ttl_secs")]
    pub extraction_cache_ttl_secs: u64,

    /// How often the cache sweeper purges expired entries
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_qloo_api_url() -> String {
    "https://hackathon.api.qloo.com".to_string()
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_signal_weight() -> u32 {
    10
}

fn default_result_cap() -> usize {
    20
}

fn default_recommendation_cache_ttl_secs() -> u64 {
    CacheNamespace::QlooRecommendations.default_ttl().as_secs()
}

fn default_entity_cache_ttl_secs() -> u64 {
    CacheNamespace::EntityResolution.default_ttl().as_secs()
}

fn default_extraction_cache_ttl_secs() -> u64 {
    CacheNamespace::LlmExtraction.default_ttl().as_secs()
}

fn default_cache_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            signal_weight: self.signal_weight,
            result_cap: self.result_cap,
            result_cap_overrides: parse_result_cap_overrides(&self.result_cap_overrides),
            upstream_timeout: self.upstream_timeout(),
            recommendation_ttl: Duration::from_secs(self.recommendation_cache_ttl_secs),
            entity_ttl: Duration::from_secs(self.entity_cache_ttl_secs),
            extraction_ttl: Duration::from_secs(self.extraction_cache_ttl_secs),
        }
    }
}

/// Tunables for the aggregation pipeline, split out of [`Config`] so the
/// engine can be built without touching the environment.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub signal_weight: u32,
    pub result_cap: usize,
    /// Category → result cap. Replaces keyword sniffing on the taste text.
    pub result_cap_overrides: HashMap<String, usize>,
    pub upstream_timeout: Duration,
    pub recommendation_ttl: Duration,
    pub entity_ttl: Duration,
    pub extraction_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            signal_weight: default_signal_weight(),
            result_cap: default_result_cap(),
            result_cap_overrides: HashMap::new(),
            upstream_timeout: Duration::from_millis(default_upstream_timeout_ms()),
            recommendation_ttl: CacheNamespace::QlooRecommendations.default_ttl(),
            entity_ttl: CacheNamespace::EntityResolution.default_ttl(),
            extraction_ttl: CacheNamespace::LlmExtraction.default_ttl(),
        }
    }
}

impl EngineSettings {
    /// Result cap for a normalized category
    pub fn result_cap_for(&self, category: &str) -> usize {
        self.result_cap_overrides
            .get(category)
            .copied()
            .unwrap_or(self.result_cap)
    }
}

/// Parses `category=cap` pairs separated by commas. Malformed pairs are skipped.
pub fn parse_result_cap_overrides(raw: &str) -> HashMap<String, usize> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parsed = pair.split_once('=').and_then(|(category, cap)| {
                let cap = cap.trim().parse::<usize>().ok()?;
                Some((crate::models::normalize_category(category), cap))
            });
            if parsed.is_none() {
                tracing::warn!(pair = %pair, "Ignoring malformed result cap override");
            }
            parsed
        })
        .collect()
}
