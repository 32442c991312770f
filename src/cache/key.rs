use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;

/// Semantic namespaces for cached upstream results, each with its default TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    QlooRecommendations,
    EntityResolution,
    LlmExtraction,
    /// Reserved for embedding lookups; no component writes to it yet
    Embeddings,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::QlooRecommendations => "qloo_recommendations",
            CacheNamespace::EntityResolution => "entity_resolution",
            CacheNamespace::LlmExtraction => "llm_extraction",
            CacheNamespace::Embeddings => "embeddings",
        }
    }

    /// TTL applied when configuration does not override it
    pub fn default_ttl(&self) -> Duration {
        match self {
            CacheNamespace::QlooRecommendations => Duration::from_secs(15 * 60),
            CacheNamespace::EntityResolution => Duration::from_secs(30 * 60),
            CacheNamespace::LlmExtraction | CacheNamespace::Embeddings => {
                Duration::from_secs(60 * 60)
            }
        }
    }
}

impl Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic cache key built from a namespace and an ordered parameter list
///
/// Every parameter is rendered as canonical JSON: object keys are sorted at every
/// depth, so two logically identical parameter bags map to the same key no matter
/// how they were assembled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(namespace: CacheNamespace, params: &[Value]) -> Self {
        let mut key = String::from(namespace.as_str());
        for param in params {
            key.push('|');
            write_canonical(param, &mut key);
        }
        Self(key)
    }

    /// Wraps an already-built key string, e.g. one received for explicit invalidation
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in pairs.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON rendering
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_object_key_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("location".to_string(), json!("Tokyo"));
        first.insert("category".to_string(), json!("place"));
        first.insert("take".to_string(), json!(20));

        let mut second = Map::new();
        second.insert("take".to_string(), json!(20));
        second.insert("category".to_string(), json!("place"));
        second.insert("location".to_string(), json!("Tokyo"));

        let a = CacheKey::new(CacheNamespace::QlooRecommendations, &[Value::Object(first)]);
        let b = CacheKey::new(CacheNamespace::QlooRecommendations, &[Value::Object(second)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_objects_are_canonicalized() {
        let a = json!({"outer": {"b": 1, "a": [{"y": 2, "x": 1}]}});
        let b = json!({"outer": {"a": [{"x": 1, "y": 2}], "b": 1}});
        assert_eq!(
            CacheKey::new(CacheNamespace::Embeddings, &[a]),
            CacheKey::new(CacheNamespace::Embeddings, &[b])
        );
    }

    #[test]
    fn test_parameter_order_matters() {
        let a = CacheKey::new(CacheNamespace::EntityResolution, &[json!("a"), json!("b")]);
        let b = CacheKey::new(CacheNamespace::EntityResolution, &[json!("b"), json!("a")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let params = [json!(["Sushi"]), json!("place")];
        assert_ne!(
            CacheKey::new(CacheNamespace::EntityResolution, &params),
            CacheKey::new(CacheNamespace::QlooRecommendations, &params)
        );
    }

    #[test]
    fn test_separator_inside_string_does_not_collide() {
        let joined = CacheKey::new(CacheNamespace::EntityResolution, &[json!("a|b")]);
        let split = CacheKey::new(CacheNamespace::EntityResolution, &[json!("a"), json!("b")]);
        assert_ne!(joined, split);
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::new(
            CacheNamespace::EntityResolution,
            &[json!(["Sushi"]), json!("place"), Value::Null],
        );
        assert_eq!(key.as_str(), r#"entity_resolution|["Sushi"]|"place"|null"#);
    }

    #[test]
    fn test_default_ttls() {
        assert_eq!(
            CacheNamespace::QlooRecommendations.default_ttl(),
            Duration::from_secs(900)
        );
        assert_eq!(
            CacheNamespace::EntityResolution.default_ttl(),
            Duration::from_secs(1800)
        );
        assert_eq!(CacheNamespace::Embeddings.default_ttl(), Duration::from_secs(3600));
    }
}
