//! Integration tests for the Axum web server.
//!
//! These tests verify that routes are wired to handlers and that runtime
//! errors surface with the expected status codes.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mhos_axum::bootstrap::{CorsConfig, ServerConfig, bootstrap};
use mhos_axum::routes::create_router;

async fn test_app(data_root: &std::path::Path) -> (Router, mhos_axum::AppState) {
    let ctx = Arc::new(
        bootstrap(ServerConfig::for_data_root(data_root))
            .await
            .unwrap(),
    );
    (create_router(Arc::clone(&ctx), &CorsConfig::AllowAll), ctx)
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn api_health_reports_counters() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents"], 0);
}

#[tokio::test]
async fn bootstrap_creates_data_directories() {
    let dir = tempfile::tempdir().unwrap();
    let _ = test_app(dir.path()).await;

    assert!(dir.path().join("logs/run").is_dir());
    assert!(dir.path().join("logs/audit").is_dir());
}

#[tokio::test]
async fn agents_endpoint_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::builder().uri("/api/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"[]");
}

#[tokio::test]
async fn starting_a_missing_executable_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, ctx) = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/organizer/start")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"command":"/nonexistent/bin/organizer"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["status"], 422);
    assert!(body["error"].as_str().unwrap().contains("/nonexistent/bin/organizer"));
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/organizer/start")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"command":"  "}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stopping_an_unknown_agent_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/ghost/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/servers/kokoro")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn configured_servers_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let servers = dir.path().join("servers.json");
    std::fs::write(
        &servers,
        r#"[{"name":"whisper","command":"/nonexistent/whisper-server"}]"#,
    )
    .unwrap();
    let config = ServerConfig::for_data_root(dir.path()).with_servers_file(&servers);
    let ctx = Arc::new(bootstrap(config).await.unwrap());
    let app = create_router(ctx, &CorsConfig::AllowAll);

    let response = app
        .oneshot(Request::builder().uri("/api/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["name"], "whisper");
    assert_eq!(body[0]["running"], false);
}

#[tokio::test]
async fn template_stream_is_event_stream_and_reports_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (app, ctx) = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/templates/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(ctx.streams.session_count(), 1);

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let chunk = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(chunk.starts_with("event: info\n"));
    assert!(chunk.contains("directory not found"));

    ctx.streams.close_all();
}
