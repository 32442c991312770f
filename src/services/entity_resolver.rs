use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::{
    cache::{CacheKey, CacheNamespace, TtlCache},
    error::{AppError, AppResult},
    models::{normalize_category, ResolvedEntities, ResolvedEntity},
    services::providers::{EntityQuery, EntitySearchIndex},
};

/// Resolves canonical entity names to concrete identifiers via the search index
#[derive(Clone)]
pub struct EntityResolver {
    index: Arc<dyn EntitySearchIndex>,
    cache: TtlCache,
    ttl: Duration,
}

impl EntityResolver {
    pub fn new(index: Arc<dyn EntitySearchIndex>, cache: TtlCache, ttl: Duration) -> Self {
        Self { index, cache, ttl }
    }

    /// Resolves every name scoped by category and optional location
    ///
    /// Names with no matches are skipped, as are names whose lookup failed upstream.
    /// Fails with [`AppError::NoEntitiesResolved`] only when nothing resolved at all.
    pub async fn resolve(
        &self,
        entity_names: &[String],
        category: &str,
        location: Option<&str>,
    ) -> AppResult<ResolvedEntities> {
        if entity_names.is_empty() {
            return Err(AppError::NoEntitiesResolved(Vec::new()));
        }

        let category = normalize_category(category);
        let key = CacheKey::new(
            CacheNamespace::EntityResolution,
            &[json!(entity_names), json!(category), json!(location)],
        );

        if let Some(cached) = self.cache.get::<ResolvedEntities>(&key) {
            return Ok(cached);
        }

        let (resolved, complete) = self
            .resolve_uncached(entity_names, &category, location)
            .await?;

        // Only results where every lookup reached the index are cached
        if !complete {
            tracing::debug!(key = %key, "Partial resolution not cached");
        } else if !self.cache.set(&key, &resolved, Some(self.ttl)) {
            tracing::warn!(key = %key, "Cache write failed, continuing uncached");
        }

        Ok(resolved)
    }

    /// Returns the resolved entities and whether every lookup reached the index
    async fn resolve_uncached(
        &self,
        entity_names: &[String],
        category: &str,
        location: Option<&str>,
    ) -> AppResult<(ResolvedEntities, bool)> {
        // One task per name; results are collected in input order
        let mut tasks = Vec::with_capacity(entity_names.len());
        for name in entity_names {
            let index = Arc::clone(&self.index);
            let query = EntityQuery {
                name: name.clone(),
                category: category.to_string(),
                location: location.map(str::to_string),
            };
            tasks.push(tokio::spawn(
                async move {
                    let result = index.search(&query).await;
                    (query.name, result)
                }
                .instrument(tracing::Span::current()),
            ));
        }

        let mut entity_details: Vec<ResolvedEntity> = Vec::new();
        let mut complete = true;
        for task in tasks {
            match task.await {
                Ok((name, Ok(matches))) => {
                    if matches.is_empty() {
                        tracing::debug!(name = %name, category = %category, "No entity matches");
                    }
                    entity_details.extend(matches);
                }
                Ok((name, Err(e))) => {
                    tracing::warn!(name = %name, error = %e, "Entity search failed, skipping name");
                    complete = false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Entity search task join error");
                    complete = false;
                }
            }
        }

        if entity_details.is_empty() {
            return Err(AppError::NoEntitiesResolved(entity_names.to_vec()));
        }

        let mut seen = HashSet::new();
        let entity_ids: Vec<String> = entity_details
            .iter()
            .filter(|entity| seen.insert(entity.entity_id.as_str()))
            .map(|entity| entity.entity_id.clone())
            .collect();

        tracing::info!(
            names = entity_names.len(),
            matches = entity_details.len(),
            unique_ids = entity_ids.len(),
            complete,
            "Entities resolved"
        );

        Ok((
            ResolvedEntities {
                entity_ids,
                entity_details,
            },
            complete,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::MockEntitySearchIndex;
    use serde_json::Map;

    fn entity(id: &str, name: &str) -> ResolvedEntity {
        ResolvedEntity {
            entity_id: id.to_string(),
            name: name.to_string(),
            subtype: "urn:entity:place".to_string(),
            location: None,
            properties: Map::new(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn resolver(index: MockEntitySearchIndex) -> EntityResolver {
        EntityResolver::new(Arc::new(index), TtlCache::new(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_resolve_collects_matches_and_dedups_ids() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().returning(|query| match query.name.as_str() {
            "Sushi" => Ok(vec![entity("e1", "Sushi Saito"), entity("e2", "Sushi Dai")]),
            "Omakase" => Ok(vec![entity("e2", "Sushi Dai"), entity("e3", "Den")]),
            _ => Ok(vec![]),
        });

        let resolved = resolver(index)
            .resolve(&names(&["Sushi", "Omakase"]), "place", Some("Tokyo"))
            .await
            .unwrap();

        assert_eq!(resolved.entity_ids, vec!["e1", "e2", "e3"]);
        assert_eq!(resolved.entity_details.len(), 4);
    }

    #[tokio::test]
    async fn test_resolve_passes_normalized_scope() {
        let mut index = MockEntitySearchIndex::new();
        index
            .expect_search()
            .withf(|query| query.category == "tvshow" && query.location.as_deref() == Some("Seoul"))
            .times(1)
            .returning(|_| Ok(vec![entity("e1", "Show")]));

        let resolved = resolver(index)
            .resolve(&names(&["Show"]), "TV Show", Some("Seoul"))
            .await
            .unwrap();
        assert_eq!(resolved.entity_ids, vec!["e1"]);
    }

    #[tokio::test]
    async fn test_resolve_skips_names_without_matches() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().returning(|query| match query.name.as_str() {
            "Jazz" => Ok(vec![entity("e1", "Blue Note")]),
            _ => Ok(vec![]),
        });

        let resolved = resolver(index)
            .resolve(&names(&["Nothing", "Jazz"]), "place", None)
            .await
            .unwrap();
        assert_eq!(resolved.entity_ids, vec!["e1"]);
    }

    #[tokio::test]
    async fn test_resolve_treats_upstream_error_as_no_match() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().returning(|query| match query.name.as_str() {
            "Broken" => Err(AppError::ExternalApi("503".to_string())),
            _ => Ok(vec![entity("e1", "Blue Note")]),
        });

        let resolved = resolver(index)
            .resolve(&names(&["Broken", "Jazz"]), "place", None)
            .await
            .unwrap();
        assert_eq!(resolved.entity_ids, vec!["e1"]);
    }

    #[tokio::test]
    async fn test_resolve_fails_when_every_name_is_empty() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().returning(|_| Ok(vec![]));

        let result = resolver(index)
            .resolve(&names(&["Nothing", "Nobody"]), "place", None)
            .await;

        match result {
            Err(AppError::NoEntitiesResolved(names)) => {
                assert_eq!(names, vec!["Nothing", "Nobody"]);
            }
            other => panic!("expected NoEntitiesResolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_name_list() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().never();

        let result = resolver(index).resolve(&[], "place", None).await;
        assert!(matches!(result, Err(AppError::NoEntitiesResolved(_))));
    }

    #[tokio::test]
    async fn test_resolve_is_cached() {
        let mut index = MockEntitySearchIndex::new();
        index
            .expect_search()
            .times(1)
            .returning(|_| Ok(vec![entity("e1", "Sushi Saito")]));

        let resolver = resolver(index);
        let first = resolver.resolve(&names(&["Sushi"]), "place", Some("Tokyo")).await.unwrap();
        let second = resolver.resolve(&names(&["Sushi"]), "Place", Some("Tokyo")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cache_key_includes_location() {
        let mut index = MockEntitySearchIndex::new();
        index
            .expect_search()
            .times(2)
            .returning(|_| Ok(vec![entity("e1", "Sushi Saito")]));

        let resolver = resolver(index);
        resolver.resolve(&names(&["Sushi"]), "place", Some("Tokyo")).await.unwrap();
        resolver.resolve(&names(&["Sushi"]), "place", Some("Osaka")).await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut index = MockEntitySearchIndex::new();
        index.expect_search().times(2).returning(|_| Ok(vec![]));

        let resolver = resolver(index);
        assert!(resolver.resolve(&names(&["Sushi"]), "place", None).await.is_err());
        assert!(resolver.resolve(&names(&["Sushi"]), "place", None).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_resolution_after_upstream_error_is_not_cached() {
        let mut index = MockEntitySearchIndex::new();
        let mut ramen_calls = 0;
        index.expect_search().times(4).returning(move |query| match query.name.as_str() {
            "Ramen" => {
                ramen_calls += 1;
                if ramen_calls == 1 {
                    Err(AppError::ExternalApi("Qloo API returned status 503".to_string()))
                } else {
                    Ok(vec![entity("e3", "Ichiran")])
                }
            }
            _ => Ok(vec![entity("e1", "Sushi Saito")]),
        });

        let resolver = resolver(index);
        let first = resolver
            .resolve(&names(&["Sushi", "Ramen"]), "place", Some("Tokyo"))
            .await
            .unwrap();
        assert_eq!(first.entity_ids, vec!["e1"]);

        let second = resolver
            .resolve(&names(&["Sushi", "Ramen"]), "place", Some("Tokyo"))
            .await
            .unwrap();
        assert_eq!(second.entity_ids, vec!["e1", "e3"]);

        // Complete now, so the third call is a cache hit (times(4) above)
        let third = resolver
            .resolve(&names(&["Sushi", "Ramen"]), "place", Some("Tokyo"))
            .await
            .unwrap();
        assert_eq!(third, second);
    }

    #[tokio::test]
    async fn test_lookups_run_inside_callers_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());

        let mut index = MockEntitySearchIndex::new();
        index.expect_search().times(1).returning(|_| {
            let current = tracing::Span::current();
            assert_eq!(current.metadata().map(|m| m.name()), Some("aggregate_request"));
            Ok(vec![entity("e1", "Sushi Saito")])
        });

        let resolved = resolver(index)
            .resolve(&names(&["Sushi"]), "place", None)
            .instrument(tracing::info_span!("aggregate_request"))
            .await
            .unwrap();
        assert_eq!(resolved.entity_ids, vec!["e1"]);
    }
}
