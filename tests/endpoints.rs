//! Router-level tests for service endpoints, static fallback and the tunnel seam.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use forward_proxy::{HttpServer, Tunnel};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_and_service_info() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let res = server.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({ "status": "ok" }));

    let res = server.router().oneshot(get("/api")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["service"], "forward-proxy");
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn unknown_api_path_is_json_404() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let res = server.router().oneshot(get("/api/missing")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = json_body(res).await;
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["message"], "Endpoint /api/missing does not exist.");
}

#[tokio::test]
async fn contact_requires_all_fields() {
    let mut config = common::test_config();
    config.secrets.external_key = Some("key".into());
    let server = HttpServer::new(config).unwrap();

    for body in [
        json!({ "name": "Ada", "email": "ada@example.com" }),
        json!({ "name": " ", "email": "ada@example.com", "message": "hi" }),
        json!([]),
    ] {
        let res = server.router().oneshot(post_json("/api/contact", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "Validation Failed");
    }
}

#[tokio::test]
async fn contact_without_secret_is_unavailable() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let res = server
        .router()
        .oneshot(post_json(
            "/api/contact",
            json!({ "name": "Ada", "email": "ada@example.com", "message": "hi" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(res).await;
    assert!(!body.to_string().contains("EXTERNAL_SECRET_KEY"));
}

#[tokio::test]
async fn contact_with_secret_succeeds() {
    let mut config = common::test_config();
    config.secrets.external_key = Some("key".into());
    let server = HttpServer::new(config).unwrap();

    let res = server
        .router()
        .oneshot(post_json(
            "/api/contact",
            json!({ "name": "Ada", "email": "ada@example.com", "message": "hi" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Thank you, Ada. Your message has been received.");
    assert_eq!(body["receivedData"], json!({ "name": "Ada", "email": "ada@example.com" }));
}

#[tokio::test]
async fn oversized_invocation_is_rejected() {
    let mut config = common::test_config();
    config.targets.json_body_limit = 32;
    let server = HttpServer::new(config).unwrap();

    let body = json!({ "url": "http://example.com/", "data": "x".repeat(64) });
    let res = server.router().oneshot(post_json("/proxy", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn invocation_with_bad_method_is_rejected() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let body = json!({ "url": "http://example.com/", "method": "NOT A METHOD" });
    let res = server.router().oneshot(post_json("/proxy", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invocation_with_mistyped_fields_is_not_a_url_error() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let body = json!({ "url": "http://example.com/", "method": 5 });
    let res = server.router().oneshot(post_json("/proxy", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "Invalid invocation");
}

#[tokio::test]
async fn proxy_routes_refuse_work_while_shutting_down() {
    let server = HttpServer::new(common::test_config()).unwrap();
    server.shutdown_handle().trigger();

    let uri = format!("/p/{}", common::encode("http://example.com/"));
    let res = server.router().oneshot(get(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(res).await, json!({ "error": "Server shutting down" }));

    let res = server.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unmatched_paths_fall_back_to_static_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

    let mut config = common::test_config();
    config.static_files.enabled = true;
    config.static_files.root = dir.path().to_string_lossy().into_owned();
    let server = HttpServer::new(config).unwrap();

    let res = server.router().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"console.log(1)");

    let res = server.router().oneshot(get("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.router().oneshot(get("/nope.css")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let server = HttpServer::new(common::test_config()).unwrap();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/proxy")
        .header("origin", "http://app.test")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let res = server.router().oneshot(request).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}

/// Claims everything under `/bare/` plus one path that the proxy would
/// otherwise serve.
struct BareTunnel;

impl Tunnel for BareTunnel {
    fn should_route(&self, request: &Request<Body>) -> bool {
        let path = request.uri().path();
        path.starts_with("/bare/") || path == "/p/claimed"
    }

    fn route(&self, request: Request<Body>) -> BoxFuture<'static, Response> {
        let path = request.uri().path().to_string();
        Box::pin(async move { (StatusCode::SWITCHING_PROTOCOLS, path).into_response() })
    }
}

#[tokio::test]
async fn tunnel_takes_priority_over_routes() {
    let server = HttpServer::new(common::test_config())
        .unwrap()
        .with_tunnel(Arc::new(BareTunnel));

    for path in ["/bare/v1/", "/p/claimed"] {
        let res = server.router().oneshot(get(path)).await.unwrap();
        assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS, "{path}");
    }

    let res = server.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
