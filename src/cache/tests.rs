use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::CacheConfig;
use crate::vectordb::{Citation, MockVectorIndex};

fn config() -> CacheConfig {
    CacheConfig {
        hit_threshold: 0.93,
        cacheable_confidence: 0.7,
        ttl: Duration::from_secs(3_600),
    }
}

fn cache() -> SemanticCache<MockVectorIndex> {
    SemanticCache::new(Arc::new(MockVectorIndex::new()), config())
}

fn citation() -> Citation {
    Citation {
        title: "Module 3".to_string(),
        score: 0.88,
        chunk_index: 2,
    }
}

#[tokio::test]
async fn store_then_exact_lookup_round_trips() {
    let cache = cache();
    let embedding = vec![1.0, 0.0];

    let stored = cache
        .store("t", "how to export", embedding.clone(), "Use File → Export.", &[citation()], 0.85, false)
        .await
        .unwrap();
    assert!(stored);

    let hit = cache
        .lookup("t", "how to export", &embedding)
        .await
        .unwrap()
        .expect("expected a hit");

    assert_eq!(hit.response, "Use File → Export.");
    assert_eq!(hit.sources.len(), 1);
    assert_eq!(hit.score, 1.0);
    assert_eq!(hit.hit_count, 1);
}

#[tokio::test]
async fn semantically_similar_query_hits_without_exact_match() {
    let cache = cache();

    cache
        .store("t", "how to export", vec![1.0, 0.0], "Use File → Export.", &[], 0.85, false)
        .await
        .unwrap();

    // Different text, nearly identical embedding.
    let hit = cache
        .lookup("t", "how do I save as PDF", &[0.999, 0.01])
        .await
        .unwrap()
        .expect("expected a semantic hit");

    assert_eq!(hit.response, "Use File → Export.");
    assert!(hit.score >= 0.93);
}

#[tokio::test]
async fn dissimilar_query_misses() {
    let cache = cache();

    cache
        .store("t", "how to export", vec![1.0, 0.0], "Use File → Export.", &[], 0.85, false)
        .await
        .unwrap();

    let miss = cache.lookup("t", "unrelated", &[0.0, 1.0]).await.unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn low_confidence_or_escalated_responses_are_not_stored() {
    let cache = cache();

    let low = cache
        .store("t", "q1", vec![1.0, 0.0], "low conviction answer", &[], 0.4, false)
        .await
        .unwrap();
    let escalated = cache
        .store("t", "q2", vec![0.0, 1.0], "escalated answer", &[], 0.9, true)
        .await
        .unwrap();

    assert!(!low);
    assert!(!escalated);
    assert!(cache.lookup("t", "q1", &[1.0, 0.0]).await.unwrap().is_none());
    assert!(cache.lookup("t", "q2", &[0.0, 1.0]).await.unwrap().is_none());
}

#[tokio::test]
async fn lookups_are_tenant_scoped() {
    let cache = cache();

    cache
        .store("tenant-a", "how to export", vec![1.0, 0.0], "A's answer", &[], 0.85, false)
        .await
        .unwrap();

    let cross = cache
        .lookup("tenant-b", "how to export", &[1.0, 0.0])
        .await
        .unwrap();
    assert!(cross.is_none());
}

#[tokio::test]
async fn generation_bump_invalidates_prior_entries() {
    let cache = cache();
    let embedding = vec![1.0, 0.0];

    cache
        .store("t", "how to export", embedding.clone(), "old answer", &[], 0.85, false)
        .await
        .unwrap();
    assert!(cache.lookup("t", "how to export", &embedding).await.unwrap().is_some());

    cache.bump_generation("t");

    // Both the exact and semantic tiers must ignore stale entries.
    let stale = cache.lookup("t", "how to export", &embedding).await.unwrap();
    assert!(stale.is_none());
}

#[tokio::test]
async fn entries_stored_after_bump_are_served() {
    let cache = cache();
    let embedding = vec![1.0, 0.0];

    cache.bump_generation("t");
    cache
        .store("t", "how to export", embedding.clone(), "fresh answer", &[], 0.85, false)
        .await
        .unwrap();

    let hit = cache
        .lookup("t", "how to export", &embedding)
        .await
        .unwrap()
        .expect("fresh-generation entry should hit");
    assert_eq!(hit.response, "fresh answer");
}

#[tokio::test]
async fn generations_are_independent_per_tenant() {
    let cache = cache();

    cache.bump_generation("tenant-a");
    cache.bump_generation("tenant-a");

    assert_eq!(cache.current_generation("tenant-a"), 2);
    assert_eq!(cache.current_generation("tenant-b"), 0);
}
