use super::*;
use tempfile::TempDir;

// Port 1 is never listening; any test that reaches the network fails
// fast instead of hitting a real server.
async fn test_service() -> (RagService, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("default config should be valid");
    config.ollama.port = 1;
    let service = RagService::new(config)
        .await
        .expect("should assemble service");
    (service, temp_dir)
}

#[tokio::test]
async fn ingest_rejects_empty_content() {
    let (service, _temp_dir) = test_service().await;

    let result = service
        .ingest(IngestRequest {
            content: "   ".to_string(),
            session_id: "abc".to_string(),
            source_url: "https://example.com".to_string(),
            title: String::new(),
        })
        .await;

    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn ingest_rejects_empty_session_id() {
    let (service, _temp_dir) = test_service().await;

    let result = service
        .ingest(IngestRequest {
            content: "Some document content.".to_string(),
            session_id: "".to_string(),
            source_url: String::new(),
            title: String::new(),
        })
        .await;

    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn ingest_rejects_content_below_chunk_minimum() {
    let (service, _temp_dir) = test_service().await;

    // A few words never reach min_tokens, so chunking yields nothing and
    // the pipeline stops before contacting the embedding server.
    let result = service
        .ingest(IngestRequest {
            content: "Too short to chunk.".to_string(),
            session_id: "abc".to_string(),
            source_url: String::new(),
            title: String::new(),
        })
        .await;

    assert!(matches!(result, Err(RagError::NoChunksProduced)));
}

#[tokio::test]
async fn retrieve_rejects_empty_query() {
    let (service, _temp_dir) = test_service().await;

    let result = service
        .retrieve(RetrieveRequest {
            query: "".to_string(),
            session_id: "abc".to_string(),
            max_results: 5,
            similarity_threshold: 0.0,
        })
        .await;

    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn retrieve_rejects_out_of_range_max_results() {
    let (service, _temp_dir) = test_service().await;

    for max_results in [0, MAX_RESULTS_LIMIT + 1] {
        let result = service
            .retrieve(RetrieveRequest {
                query: "query".to_string(),
                session_id: "abc".to_string(),
                max_results,
                similarity_threshold: 0.0,
            })
            .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }
}

#[tokio::test]
async fn retrieve_rejects_out_of_range_threshold() {
    let (service, _temp_dir) = test_service().await;

    for threshold in [-0.1, 1.1] {
        let result = service
            .retrieve(RetrieveRequest {
                query: "query".to_string(),
                session_id: "abc".to_string(),
                max_results: 5,
                similarity_threshold: threshold,
            })
            .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }
}

#[tokio::test]
async fn cleanup_on_fresh_service_deletes_nothing() {
    let (service, _temp_dir) = test_service().await;

    let summary = service.cleanup().await.expect("cleanup should succeed");
    assert_eq!(summary.collections_checked, 0);
    assert_eq!(summary.collections_deleted, 0);
    assert!(summary.errors.is_empty());
}

#[tokio::test]
async fn session_info_for_unknown_session() {
    let (service, _temp_dir) = test_service().await;

    let info = service
        .session_info("ghost")
        .await
        .expect("describe should not error");
    assert!(!info.exists);
    assert_eq!(info.collection_name, "session_ghost");
}

fn search_result(similarity: f32) -> crate::database::lancedb::SearchResult {
    crate::database::lancedb::SearchResult {
        content: format!("chunk at {}", similarity),
        metadata: ChunkMetadata {
            session_id: "abc".to_string(),
            source_url: String::new(),
            document_title: String::new(),
            chunk_index: 0,
            token_count: 1,
            created_at: String::new(),
        },
        distance: 1.0 - similarity,
        similarity_score: similarity,
    }
}

#[test]
fn ranks_are_assigned_before_threshold_filtering() {
    let results = vec![
        search_result(0.95),
        search_result(0.40),
        search_result(0.80),
    ];

    let ranked = rank_and_filter(results, 0.5);

    // The 0.40 result at position 2 is filtered out; surviving ranks
    // keep their original positions, leaving a gap.
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].rank, 1);
    assert_eq!(ranked[1].rank, 3);
}

#[test]
fn high_threshold_filters_everything() {
    let results = vec![search_result(0.2), search_result(0.1)];
    assert!(rank_and_filter(results, 0.9).is_empty());
}

#[test]
fn zero_threshold_keeps_all_results() {
    let results = vec![search_result(0.9), search_result(0.0)];
    let ranked = rank_and_filter(results, 0.0);
    assert_eq!(ranked.len(), 2);
}

#[test]
fn retrieve_request_defaults() {
    let request: RetrieveRequest =
        serde_json::from_str(r#"{"query": "q", "session_id": "abc"}"#)
            .expect("should deserialize with defaults");
    assert_eq!(request.max_results, 5);
    assert!((request.similarity_threshold - 0.0).abs() < f32::EPSILON);
}
