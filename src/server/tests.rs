use super::*;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;

async fn test_router() -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("default config should be valid");
    // Port 1 is never listening; nothing in these tests should reach it.
    config.ollama.port = 1;
    let service = RagService::new(config)
        .await
        .expect("should assemble service");
    (router(service), temp_dir)
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("should read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn root_describes_the_service() {
    let (app, _temp_dir) = test_router().await;

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("should handle request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "rag-builder");
    assert_eq!(body["chunking"]["target_tokens"], 512);
}

#[tokio::test]
async fn embed_with_empty_content_is_bad_request() {
    let (app, _temp_dir) = test_router().await;

    let request = Request::post("/embed")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"content": "", "session_id": "abc"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("should handle request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error message").contains("Invalid input"));
}

#[tokio::test]
async fn retrieve_with_bad_max_results_is_bad_request() {
    let (app, _temp_dir) = test_router().await;

    let request = Request::post("/retrieve")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"query": "q", "session_id": "abc", "max_results": 50}"#,
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("should handle request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn collections_list_starts_empty() {
    let (app, _temp_dir) = test_router().await;

    let response = app
        .oneshot(
            Request::get("/collections")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("should handle request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 0);
}

#[tokio::test]
async fn missing_collection_is_not_found() {
    let (app, _temp_dir) = test_router().await;

    let response = app
        .oneshot(
            Request::get("/collections/ghost")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("should handle request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["exists"], false);
}

#[tokio::test]
async fn deleting_missing_collection_is_not_found() {
    let (app, _temp_dir) = test_router().await;

    let response = app
        .oneshot(
            Request::delete("/collections/ghost")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("should handle request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cleanup_reports_an_empty_sweep() {
    let (app, _temp_dir) = test_router().await;

    let response = app
        .oneshot(
            Request::post("/cleanup")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("should handle request");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["collections_deleted"], 0);
}
