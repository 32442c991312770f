use std::collections::HashSet;

use crate::models::{AggregationResult, RecommendationCandidate, ResolvedEntity, SourceOutcome};

/// Merges engine output with entity search results
///
/// Engine candidates keep their ranked order. Entity search candidates whose ID the
/// engine did not return are appended in resolution order. No scoring or re-ranking
/// happens here, and no ID appears twice in the output.
pub fn merge_candidates(
    engine_outcome: SourceOutcome,
    entity_details: Vec<ResolvedEntity>,
) -> AggregationResult {
    let (engine_candidates, engine_succeeded, degraded_reason) = match engine_outcome {
        SourceOutcome::Success(candidates) => (candidates, true, None),
        SourceOutcome::Degraded { candidates, reason } => (candidates, false, Some(reason)),
    };

    let total_from_engine = engine_candidates.len();
    let total_from_entity_search = entity_details.len();

    let capacity = total_from_engine + total_from_entity_search;
    let mut seen: HashSet<String> = HashSet::with_capacity(capacity);
    let mut candidates: Vec<RecommendationCandidate> = Vec::with_capacity(capacity);

    for candidate in engine_candidates {
        if seen.insert(candidate.entity_id.clone()) {
            candidates.push(candidate);
        }
    }

    let mut unique_added_from_entity_search = 0;
    for entity in entity_details {
        if seen.insert(entity.entity_id.clone()) {
            candidates.push(RecommendationCandidate::from(entity));
            unique_added_from_entity_search += 1;
        }
    }

    tracing::info!(
        engine = total_from_engine,
        entity_search = total_from_entity_search,
        added_from_entity_search = unique_added_from_entity_search,
        total = candidates.len(),
        engine_succeeded = engine_succeeded,
        "Merged candidates"
    );

    AggregationResult {
        candidates,
        total_from_engine,
        total_from_entity_search,
        unique_added_from_entity_search,
        engine_succeeded,
        degraded_reason,
    }
}
