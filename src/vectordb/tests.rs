use super::mock::{MockVectorIndex, cosine_similarity};
use super::model::{CacheRecord, ChunkMetadata, ContentType, DocumentChunk};
use super::client::VectorIndex;

fn chunk(tenant: &str, source: &str, index: u32, text: &str, embedding: Vec<f32>) -> DocumentChunk {
    DocumentChunk {
        text: text.to_string(),
        embedding,
        metadata: ChunkMetadata {
            tenant_id: tenant.to_string(),
            source: source.to_string(),
            title: source.to_string(),
            content_type: ContentType::Text,
            chunk_index: index,
            page_index: None,
        },
    }
}

#[tokio::test]
async fn search_never_returns_another_tenants_chunks() {
    let index = MockVectorIndex::new();

    index
        .upsert_chunks(vec![
            chunk("tenant-a", "a.txt", 0, "alpha content", vec![1.0, 0.0]),
            chunk("tenant-b", "b.txt", 0, "beta content", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

    let results = index
        .search_chunks("tenant-a", vec![1.0, 0.0], 10)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    for result in &results {
        assert_eq!(result.metadata.tenant_id, "tenant-a");
    }
}

#[tokio::test]
async fn duplicate_chunk_key_replaces_prior_value() {
    let index = MockVectorIndex::new();

    index
        .upsert_chunks(vec![chunk("t", "doc.txt", 0, "old text", vec![1.0, 0.0])])
        .await
        .unwrap();
    index
        .upsert_chunks(vec![chunk("t", "doc.txt", 0, "new text", vec![1.0, 0.0])])
        .await
        .unwrap();

    assert_eq!(index.chunk_count(), 1);
    let results = index.search_chunks("t", vec![1.0, 0.0], 10).await.unwrap();
    assert_eq!(results[0].text, "new text");
}

#[tokio::test]
async fn results_ordered_by_score_with_deterministic_ties() {
    let index = MockVectorIndex::new();

    index
        .upsert_chunks(vec![
            chunk("t", "b.txt", 3, "far", vec![0.2, 0.8]),
            // Two identical vectors tie on score; lower chunk_index wins.
            chunk("t", "a.txt", 2, "tie-high-index", vec![1.0, 0.0]),
            chunk("t", "a.txt", 1, "tie-low-index", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

    let results = index.search_chunks("t", vec![1.0, 0.0], 10).await.unwrap();

    assert_eq!(results[0].text, "tie-low-index");
    assert_eq!(results[1].text, "tie-high-index");
    assert_eq!(results[2].text, "far");
}

#[tokio::test]
async fn limit_truncates_results() {
    let index = MockVectorIndex::new();

    let chunks: Vec<DocumentChunk> = (0..10)
        .map(|i| chunk("t", "doc.txt", i, &format!("chunk {i}"), vec![1.0, 0.0]))
        .collect();
    index.upsert_chunks(chunks).await.unwrap();

    let results = index.search_chunks("t", vec![1.0, 0.0], 4).await.unwrap();
    assert_eq!(results.len(), 4);
}

#[tokio::test]
async fn cache_records_are_tenant_scoped() {
    let index = MockVectorIndex::new();

    let record = |tenant: &str| CacheRecord {
        tenant_id: tenant.to_string(),
        query_text: "how to export".to_string(),
        response: "Use File → Export.".to_string(),
        sources_json: "[]".to_string(),
        confidence: 0.8,
        generation: 1,
        created_at: 0,
    };

    index
        .upsert_cache_record(vec![1.0, 0.0], record("tenant-a"))
        .await
        .unwrap();
    index
        .upsert_cache_record(vec![1.0, 0.0], record("tenant-b"))
        .await
        .unwrap();

    let hits = index.search_cache("tenant-a", vec![1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.tenant_id, "tenant-a");
}

#[test]
fn cosine_similarity_basics() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
}
