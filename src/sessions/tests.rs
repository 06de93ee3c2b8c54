use super::*;
use crate::database::lancedb::ChunkMetadata;
use chrono::Duration;
use tempfile::TempDir;

const DIMENSION: usize = 5;

async fn test_manager() -> (SessionIndexManager, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::new(temp_dir.path().join("sessions.db"))
        .await
        .expect("should create database");
    let vector_store = VectorStore::connect(temp_dir.path().join("vectors"))
        .await
        .expect("should connect to vector store");
    let manager = SessionIndexManager::new(
        database,
        vector_store,
        DIMENSION,
        SessionConfig::default(),
    );
    (manager, temp_dir)
}

fn test_record(id: &str, session_id: &str, seed: f32) -> ChunkRecord {
    let mut vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    for (i, val) in vector.iter_mut().enumerate() {
        *val += seed.mul_add(0.01, i as f32 * 0.001);
    }

    ChunkRecord {
        id: id.to_string(),
        vector,
        content: format!("Content for {}", id),
        metadata: ChunkMetadata {
            session_id: session_id.to_string(),
            source_url: "https://example.com/doc".to_string(),
            document_title: "Test Document".to_string(),
            chunk_index: 0,
            token_count: 10,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[test]
fn collection_names_are_sanitized() {
    assert_eq!(collection_name_for("abc123"), "session_abc123");
    assert_eq!(collection_name_for("user@example.com"), "session_user_example_com");
    assert_eq!(collection_name_for("keep_under-score"), "session_keep_under-score");
    assert_eq!(collection_name_for("spaces and/slashes"), "session_spaces_and_slashes");
    assert_eq!(collection_name_for(""), "session_");
}

#[test]
fn sanitization_can_collide() {
    // "a.b" and "a_b" share a collection after sanitization.
    assert_eq!(collection_name_for("a.b"), collection_name_for("a_b"));
}

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let (manager, _temp_dir) = test_manager().await;

    let first = manager
        .get_or_create("abc")
        .await
        .expect("first create should succeed");
    let second = manager
        .get_or_create("abc")
        .await
        .expect("second create should observe the first");

    assert_eq!(first, second);

    let sessions = manager.list_sessions().await.expect("should list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].collection_name, "session_abc");
}

#[tokio::test]
async fn store_and_search_roundtrip() {
    let (manager, _temp_dir) = test_manager().await;

    let records = vec![
        test_record("chunk_1", "abc", 1.0),
        test_record("chunk_2", "abc", 5.0),
        test_record("chunk_3", "abc", 20.0),
    ];
    let summary = manager
        .store("abc", &records)
        .await
        .expect("should store chunks");
    assert_eq!(summary.chunks_stored, 3);
    assert_eq!(summary.collection_name, "session_abc");

    let outcome = manager
        .search("abc", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("should search");
    assert!(outcome.collection_exists);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.total_chunks_searched, 3);
    for pair in outcome.results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn store_rejects_empty_batch() {
    let (manager, _temp_dir) = test_manager().await;

    let result = manager.store("abc", &[]).await;
    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn search_missing_session_is_empty_not_error() {
    let (manager, _temp_dir) = test_manager().await;

    let outcome = manager
        .search("never-created", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("missing session should not error");

    assert!(!outcome.collection_exists);
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.total_chunks_searched, 0);
}

#[tokio::test]
async fn describe_session_reports_size() {
    let (manager, _temp_dir) = test_manager().await;

    let missing = manager
        .describe_session("abc")
        .await
        .expect("describe should not error");
    assert!(!missing.exists);
    assert!(missing.chunk_count.is_none());

    manager
        .store("abc", &[test_record("chunk_1", "abc", 1.0)])
        .await
        .expect("should store chunk");

    let info = manager
        .describe_session("abc")
        .await
        .expect("describe should not error");
    assert!(info.exists);
    assert_eq!(info.chunk_count, Some(1));
    assert!(info.created_at.is_some());
    assert!(info.expires_at.is_some());
}

#[tokio::test]
async fn delete_session_reports_existence() {
    let (manager, _temp_dir) = test_manager().await;

    manager
        .store("abc", &[test_record("chunk_1", "abc", 1.0)])
        .await
        .expect("should store chunk");

    assert!(
        manager
            .delete_session("abc")
            .await
            .expect("delete should succeed")
    );
    assert!(
        !manager
            .delete_session("abc")
            .await
            .expect("second delete should not error")
    );

    let outcome = manager
        .search("abc", &[0.1, 0.2, 0.3, 0.4, 0.5], 10)
        .await
        .expect("search after delete should not error");
    assert!(!outcome.collection_exists);
}

#[tokio::test]
async fn expiry_sweep_deletes_only_old_collections() {
    let (manager, _temp_dir) = test_manager().await;

    manager
        .store("old", &[test_record("chunk_1", "old", 1.0)])
        .await
        .expect("should store old session");
    manager
        .store("new", &[test_record("chunk_1", "new", 2.0)])
        .await
        .expect("should store new session");

    // Sweep from two TTLs in the future sees both sessions expired;
    // sweep from now sees neither.
    let now = Utc::now().naive_utc();
    let untouched = manager
        .delete_expired(now)
        .await
        .expect("sweep should succeed");
    assert_eq!(untouched.collections_checked, 2);
    assert_eq!(untouched.collections_deleted, 0);

    let ttl = SessionConfig::default().ttl();
    let far_future = now + ttl + ttl + Duration::hours(1);
    let swept = manager
        .delete_expired(far_future)
        .await
        .expect("sweep should succeed");
    assert_eq!(swept.collections_checked, 2);
    assert_eq!(swept.collections_deleted, 2);
    assert!(swept.errors.is_empty());

    let sessions = manager.list_sessions().await.expect("should list");
    assert!(sessions.is_empty());
}
