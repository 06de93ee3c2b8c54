use super::*;
use tempfile::TempDir;

async fn test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::connect(temp_dir.path().join("vectors"))
        .await
        .expect("should connect to vector store");
    (store, temp_dir)
}

fn test_record(id: &str, session_id: &str, seed: f32) -> ChunkRecord {
    let mut vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    for (i, val) in vector.iter_mut().enumerate() {
        *val += seed.mul_add(0.01, i as f32 * 0.001);
    }

    ChunkRecord {
        id: id.to_string(),
        vector,
        content: format!("This is test content for chunk {}", id),
        metadata: ChunkMetadata {
            session_id: session_id.to_string(),
            source_url: "https://example.com/doc".to_string(),
            document_title: "Test Document".to_string(),
            chunk_index: 0,
            token_count: 25,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[tokio::test]
async fn create_collection_is_idempotent() {
    let (store, _temp_dir) = test_store().await;

    store
        .create_collection_if_absent("session_a", 5)
        .await
        .expect("first create should succeed");
    store
        .create_collection_if_absent("session_a", 5)
        .await
        .expect("second create should be a no-op");

    assert!(
        store
            .collection_exists("session_a")
            .await
            .expect("should check existence")
    );
    assert_eq!(store.count("session_a").await.expect("should count"), 0);
}

#[tokio::test]
async fn upsert_and_count() {
    let (store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("chunk_1", "abc", 1.0),
        test_record("chunk_2", "abc", 2.0),
        test_record("chunk_3", "abc", 3.0),
    ];

    store
        .upsert_chunks("session_abc", &records)
        .await
        .expect("should store chunks");

    assert_eq!(store.count("session_abc").await.expect("should count"), 3);
}

#[tokio::test]
async fn upsert_same_id_overwrites() {
    let (store, _temp_dir) = test_store().await;

    let original = test_record("chunk_1", "abc", 1.0);
    store
        .upsert_chunks("session_abc", &[original])
        .await
        .expect("should store chunk");

    let mut replacement = test_record("chunk_1", "abc", 2.0);
    replacement.content = "Replacement content".to_string();
    store
        .upsert_chunks("session_abc", &[replacement])
        .await
        .expect("should overwrite chunk");

    assert_eq!(store.count("session_abc").await.expect("should count"), 1);

    let results = store
        .search("session_abc", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("should search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "Replacement content");
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("chunk_1", "abc", 1.0),
        test_record("chunk_2", "abc", 5.0),
        test_record("chunk_3", "abc", 20.0),
    ];
    store
        .upsert_chunks("session_abc", &records)
        .await
        .expect("should store chunks");

    let results = store
        .search("session_abc", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("should search");

    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance, "ascending by distance");
    }
    for result in &results {
        assert!((result.similarity_score - (1.0 - result.distance)).abs() < f32::EPSILON);
        assert_eq!(result.metadata.session_id, "abc");
    }
}

#[tokio::test]
async fn search_respects_limit() {
    let (store, _temp_dir) = test_store().await;

    let records: Vec<ChunkRecord> = (0..6)
        .map(|i| test_record(&format!("chunk_{}", i), "abc", i as f32))
        .collect();
    store
        .upsert_chunks("session_abc", &records)
        .await
        .expect("should store chunks");

    let results = store
        .search("session_abc", &[0.1, 0.2, 0.3, 0.4, 0.5], 2)
        .await
        .expect("should search");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn collections_are_isolated() {
    let (store, _temp_dir) = test_store().await;

    store
        .upsert_chunks("session_one", &[test_record("chunk_1", "one", 1.0)])
        .await
        .expect("should store in first collection");
    store
        .upsert_chunks(
            "session_two",
            &[
                test_record("chunk_1", "two", 2.0),
                test_record("chunk_2", "two", 3.0),
            ],
        )
        .await
        .expect("should store in second collection");

    assert_eq!(store.count("session_one").await.expect("count one"), 1);
    assert_eq!(store.count("session_two").await.expect("count two"), 2);

    let results = store
        .search("session_one", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("should search");
    assert!(results.iter().all(|r| r.metadata.session_id == "one"));
}

#[tokio::test]
async fn drop_collection_removes_it() {
    let (store, _temp_dir) = test_store().await;

    store
        .upsert_chunks("session_abc", &[test_record("chunk_1", "abc", 1.0)])
        .await
        .expect("should store chunk");

    store
        .drop_collection("session_abc")
        .await
        .expect("should drop collection");

    assert!(
        !store
            .collection_exists("session_abc")
            .await
            .expect("should check existence")
    );
}

#[tokio::test]
async fn drop_missing_collection_is_ok() {
    let (store, _temp_dir) = test_store().await;

    store
        .drop_collection("session_missing")
        .await
        .expect("dropping a missing collection should not error");
}

#[tokio::test]
async fn empty_upsert_is_a_noop() {
    let (store, _temp_dir) = test_store().await;

    store
        .upsert_chunks("session_abc", &[])
        .await
        .expect("empty upsert should succeed");

    assert!(
        !store
            .collection_exists("session_abc")
            .await
            .expect("should check existence")
    );
}
