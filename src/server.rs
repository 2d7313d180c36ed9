//! HTTP API for the web front end.
//!
//! ## Why an agent factory?
//!
//! Each `/process/text` request carries its own provider, model and API key.
//! Agents are built per request from those values and dropped afterwards;
//! nothing is written to the process environment, so concurrent requests
//! with different keys never see each other's credentials. The factory is a
//! trait so tests can hand the router scripted agents.
//!
//! ## Routes
//!
//! | Method | Path                   | Purpose                              |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/`                    | Health check                         |
//! | GET    | `/providers`           | Supported providers                  |
//! | GET    | `/models/{provider}`   | Models for one provider (404 if none)|
//! | POST   | `/process/text`        | Run the pipeline, store the image    |
//! | GET    | `/image/{filename}`    | Serve a stored image inline          |
//! | GET    | `/download/{filename}` | Serve a stored image as attachment   |
//!
//! Pipeline failures are reported in the body (`success: false`) with HTTP
//! 200. Only a crashed request task yields HTTP 500.

use crate::config::{GraphConfig, ImageFormat};
use crate::error::LexiGraphError;
use crate::generate::generate_with_agents;
use crate::output::GraphOutput;
use crate::pipeline::input::{self, SUPPORTED_PROVIDERS};
use crate::pipeline::llm::Agents;
use crate::storage;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

// ── State ────────────────────────────────────────────────────────────────

/// Builds the three role agents for one request.
pub trait AgentFactory: Send + Sync {
    fn agents(
        &self,
        provider: &str,
        api_key: &str,
        config: &GraphConfig,
    ) -> Result<Agents, LexiGraphError>;
}

/// Direct HTTP agents keyed by the request's own API key.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpAgentFactory;

impl AgentFactory for HttpAgentFactory {
    fn agents(
        &self,
        provider: &str,
        api_key: &str,
        config: &GraphConfig,
    ) -> Result<Agents, LexiGraphError> {
        input::validate_api_key(provider, api_key)?;
        Agents::from_api_key(provider, api_key, config)
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Base configuration; per-request provider and model override it.
    pub config: Arc<GraphConfig>,
    pub factory: Arc<dyn AgentFactory>,
}

impl AppState {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(HttpAgentFactory),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn AgentFactory>) -> Self {
        self.factory = factory;
        self
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

fn default_provider() -> String {
    "anthropic".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResponse {
    fn generated(graph_path: String, output: GraphOutput) -> Self {
        Self {
            success: true,
            message: "Graph generated successfully".into(),
            graph_path: Some(graph_path),
            summary: Some(output.summary),
            markup: Some(output.markup),
            render_url: Some(output.render_url),
            error: None,
        }
    }

    fn failed(err: &LexiGraphError) -> Self {
        Self {
            success: false,
            message: err.user_message().into(),
            graph_path: None,
            summary: None,
            markup: None,
            render_url: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct NamedEntry {
    id: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

fn not_found(detail: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
        .into_response()
}

fn provider_display_name(id: &str) -> &'static str {
    match id {
        "anthropic" => "Anthropic",
        "openai" => "OpenAI",
        "openrouter" => "OpenRouter",
        _ => "Unknown",
    }
}

// ── Router ───────────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/", get(health_handler))
        .route("/providers", get(providers_handler))
        .route("/models/{provider}", get(models_handler))
        .route("/process/text", post(process_text_handler))
        .route("/image/{filename}", get(image_handler))
        .route("/download/{filename}", get(download_handler))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let output_dir = state.config.output_dir.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "LexiGraph API listening on http://{} (output: {})",
        listener.local_addr()?,
        output_dir.display()
    );
    axum::serve(listener, app).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "LexiGraph API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn providers_handler() -> impl IntoResponse {
    let providers: Vec<NamedEntry> = SUPPORTED_PROVIDERS
        .iter()
        .copied()
        .map(|id| NamedEntry {
            id,
            name: provider_display_name(id),
        })
        .collect();
    Json(serde_json::json!({ "providers": providers }))
}

async fn models_handler(Path(provider): Path<String>) -> Response {
    match input::available_models(&provider) {
        Some(models) => {
            let models: Vec<NamedEntry> = models
                .iter()
                .copied()
                .map(|id| NamedEntry { id, name: id })
                .collect();
            Json(serde_json::json!({ "models": models })).into_response()
        }
        None => not_found(format!("Provider {provider} not found")),
    }
}

async fn process_text_handler(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> Response {
    let dir = state.config.output_dir.clone();
    let max_age = Duration::from_secs(state.config.max_age_hours.saturating_mul(3600));
    if let Err(e) =
        tokio::task::spawn_blocking(move || storage::cleanup_old_files(&dir, max_age)).await
    {
        warn!("Output cleanup task failed: {}", e);
    }

    // Own task: a panic inside the pipeline becomes a 500, not a dropped connection.
    match tokio::spawn(process(state, request)).await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => {
            warn!("Request failed: {}", e);
            Json(ProcessResponse::failed(&e)).into_response()
        }
        Err(e) => {
            error!("Request task crashed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    detail: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn process(state: AppState, request: TextRequest) -> Result<ProcessResponse, LexiGraphError> {
    let provider = request.provider.trim().to_ascii_lowercase();
    let mut config = (*state.config).clone();
    config.provider_name = Some(provider.clone());
    config.model = request.model.filter(|m| !m.trim().is_empty());
    config.fetch_image = true;

    let agents = state.factory.agents(&provider, &request.api_key, &config)?;
    let output = generate_with_agents(&request.text, &agents, &config).await?;
    let image = output
        .image
        .as_ref()
        .ok_or_else(|| LexiGraphError::Internal("render returned no image".into()))?;

    let filename = storage::unique_filename(config.image_format);
    storage::write_atomic(&config.output_dir.join(&filename), &image.bytes).await?;
    info!("Stored graph {} ({} bytes)", filename, image.bytes.len());
    Ok(ProcessResponse::generated(filename, output))
}

async fn image_handler(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    serve_stored(&state, &filename, false).await
}

async fn download_handler(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    serve_stored(&state, &filename, true).await
}

async fn serve_stored(state: &AppState, filename: &str, attachment: bool) -> Response {
    if !storage::is_safe_filename(filename) {
        return not_found("Image file not found");
    }
    let path = state.config.output_dir.join(filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return not_found("Image file not found");
        }
        Err(e) => {
            error!("Cannot read {}: {}", path.display(), e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    detail: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let content_type = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<ImageFormat>().ok())
        .map_or("application/octet-stream", ImageFormat::content_type);

    if attachment {
        let disposition = format!("attachment; filename={filename}");
        (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            bytes,
        )
            .into_response()
    } else {
        ([(header::CONTENT_TYPE, content_type.to_string())], bytes).into_response()
    }
}
