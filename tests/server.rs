#![cfg(feature = "server")]
//! HTTP API tests: the router is driven in-process with `oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lexigraph::server::{create_router, AgentFactory, AppState, ProcessResponse};
use lexigraph::{AgentReply, Agents, ChatAgent, GraphConfig, LexiGraphError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tower::ServiceExt;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nserver-test";

const LECTURE: &str = "Photosynthesis converts light energy into chemical energy. \
It happens in the chloroplasts and has light-dependent and light-independent stages.";

// ── Test doubles ─────────────────────────────────────────────────────────────

struct EchoAgent;

#[async_trait]
impl ChatAgent for EchoAgent {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, prompt: &str) -> Result<AgentReply, LexiGraphError> {
        let content = if prompt.contains("VALID or INVALID") {
            "VALID"
        } else if prompt.contains("Lecture:") {
            "Photosynthesis:\n- Light-dependent\n- Calvin cycle"
        } else {
            "```dot\ndigraph P { P -> L; P -> C; }\n```"
        };
        Ok(AgentReply {
            content: content.to_string(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

/// Hands out scripted agents but still checks the key like the real factory.
struct MockFactory;

impl AgentFactory for MockFactory {
    fn agents(
        &self,
        provider: &str,
        api_key: &str,
        _config: &GraphConfig,
    ) -> Result<Agents, LexiGraphError> {
        lexigraph::pipeline::input::validate_api_key(provider, api_key)?;
        Ok(Agents::uniform(Arc::new(EchoAgent)))
    }
}

async fn spawn_render_stub() -> String {
    let app = Router::new().route(
        "/graphviz",
        axum::routing::get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG.to_vec()) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/graphviz")
}

fn app_for(output_dir: &Path, render_url: &str) -> Router {
    let config = GraphConfig::builder()
        .output_dir(output_dir)
        .render_base_url(render_url)
        .build()
        .unwrap();
    create_router(AppState::new(config).with_factory(Arc::new(MockFactory)))
}

fn offline_app(output_dir: &Path) -> Router {
    app_for(output_dir, "http://127.0.0.1:9/graphviz")
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Catalog endpoints ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let dir = tempfile::tempdir().unwrap();
    let response = get(offline_app(dir.path()), "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["message"], "LexiGraph API is running");
}

#[tokio::test]
async fn providers_lists_all_three() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_body(get(offline_app(dir.path()), "/providers").await).await;
    let ids: Vec<&str> = json["providers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["anthropic", "openai", "openrouter"]);
    assert_eq!(json["providers"][1]["name"], "OpenAI");
}

#[tokio::test]
async fn models_for_known_and_unknown_providers() {
    let dir = tempfile::tempdir().unwrap();
    let app = offline_app(dir.path());

    let response = get(app.clone(), "/models/openai").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["models"][0]["id"], "gpt-4o");

    let response = get(app, "/models/mystery").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert!(json["detail"].as_str().unwrap().contains("mystery"));
}

// ── /process/text ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bad_key_prefix_is_reported_in_body() {
    let dir = tempfile::tempdir().unwrap();
    let response = post_json(
        offline_app(dir.path()),
        "/process/text",
        serde_json::json!({
            "text": LECTURE,
            "provider": "anthropic",
            "api_key": "sk-wrong-prefix",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: ProcessResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert!(!body.success);
    assert!(body.graph_path.is_none());
    assert!(body.error.unwrap().contains("sk-ant-"));
}

#[tokio::test]
async fn short_text_is_reported_in_body() {
    let dir = tempfile::tempdir().unwrap();
    let response = post_json(
        offline_app(dir.path()),
        "/process/text",
        serde_json::json!({ "text": "too short", "provider": "openai", "api_key": "sk-test" }),
    )
    .await;
    let body: ProcessResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert!(!body.success);
    assert_eq!(body.message, "Please provide more lecture content.");
}

#[tokio::test]
async fn unreachable_renderer_fails_without_storing_anything() {
    let dir = tempfile::tempdir().unwrap();
    let response = post_json(
        offline_app(dir.path()),
        "/process/text",
        serde_json::json!({ "text": LECTURE, "provider": "openai", "api_key": "sk-test" }),
    )
    .await;
    let body: ProcessResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert!(!body.success);
    assert_eq!(body.message, "Failed to render the graph.");
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn successful_request_stores_and_serves_the_image() {
    let render_url = spawn_render_stub().await;
    let dir = tempfile::tempdir().unwrap();

    // Leftover from an earlier day: removed before the request runs.
    let stale = dir.path().join("graph_1_0000.png");
    std::fs::write(&stale, PNG).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(48 * 3600))
        .unwrap();

    let app = app_for(dir.path(), &render_url);
    let response = post_json(
        app.clone(),
        "/process/text",
        serde_json::json!({
            "text": LECTURE,
            "provider": "openrouter",
            "model": "openai/gpt-4o",
            "api_key": "sk-or-test",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: ProcessResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert!(body.success, "error: {:?}", body.error);
    assert_eq!(body.markup.as_deref(), Some("digraph P { P -> L; P -> C; }"));
    assert!(body.summary.unwrap().starts_with("Photosynthesis:"));
    assert!(!stale.exists());

    let filename = body.graph_path.unwrap();
    assert!(filename.starts_with("graph_") && filename.ends_with(".png"));
    assert_eq!(std::fs::read(dir.path().join(&filename)).unwrap(), PNG);

    let response = get(app.clone(), &format!("/image/{filename}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], PNG);

    let response = get(app, &format!("/download/{filename}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(disposition, format!("attachment; filename={filename}"));
}

// ── File endpoints ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_and_unsafe_files_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
    let app = offline_app(dir.path());

    for uri in ["/image/nope.png", "/download/nope.png", "/image/.env", "/image/..%2Fsecret"] {
        let response = get(app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {uri}");
    }
}

#[tokio::test]
async fn svg_files_are_served_as_svg() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("g.svg"), "<svg></svg>").unwrap();
    let response = get(offline_app(dir.path()), "/image/g.svg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
}
