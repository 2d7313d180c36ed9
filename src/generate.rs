//! Orchestration: text in, rendered knowledge graph out.
//!
//! ## Stage Order
//!
//! ```text
//! text ─▶ classify ─▶ summarize ─▶ describe ─▶ normalize ─▶ validate ─▶ render
//!         (Validating) (Analyzing)  (────────── Generating ─────────)  (Rendering)
//! ```
//!
//! Stages run strictly in sequence; each one needs the previous one's output.
//! The first failure ends the request: a rejected classification never
//! reaches the summarizer, and invalid markup is never sent to the render
//! service. Every stage reports through the configured
//! [`crate::progress::PipelineProgressCallback`].

use crate::config::GraphConfig;
use crate::error::LexiGraphError;
use crate::output::{GraphOutput, GraphStats};
use crate::pipeline::llm::{self, AgentReply, Agents, ContentVerdict};
use crate::pipeline::render::RenderService;
use crate::pipeline::{input, normalize, validate};
use crate::progress::{NoopProgressCallback, PipelineProgressCallback, Stage};
use crate::storage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
const FALLBACK_MODEL: &str = "gpt-4o-mini";

/// Turn lecture text into a rendered knowledge graph.
///
/// This is the primary entry point for the library. Agents are built from
/// `config` (see [`resolve_agents`]).
///
/// # Errors
/// Any stage failure, e.g. [`LexiGraphError::ClassificationRejected`],
/// a provider error, [`LexiGraphError::InvalidMarkup`] or
/// [`LexiGraphError::RenderFailed`].
pub async fn generate(
    text: impl AsRef<str>,
    config: &GraphConfig,
) -> Result<GraphOutput, LexiGraphError> {
    let agents = resolve_agents(config)?;
    generate_with_agents(text, &agents, config).await
}

/// [`generate`] with caller-supplied agents.
pub async fn generate_with_agents(
    text: impl AsRef<str>,
    agents: &Agents,
    config: &GraphConfig,
) -> Result<GraphOutput, LexiGraphError> {
    let total_start = Instant::now();
    let noop = NoopProgressCallback;
    let cb: &dyn PipelineProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };
    let mut stats = GraphStats {
        provider: agents.summarizer.provider().to_string(),
        ..Default::default()
    };

    // ── Stage 1: Validating ──────────────────────────────────────────────
    let ((text, verdict_reply), ms) = run_stage(cb, Stage::Validating, async {
        let text = input::validate_input_text(text.as_ref(), config.min_input_chars)?;
        if config.skip_classification {
            debug!("Classification skipped");
            return Ok((text.to_string(), None));
        }
        let (verdict, reply) = llm::classify(agents.classifier.as_ref(), text).await?;
        if verdict == ContentVerdict::Invalid {
            return Err(LexiGraphError::ClassificationRejected);
        }
        Ok::<_, LexiGraphError>((text.to_string(), Some(reply)))
    })
    .await?;
    if let Some(reply) = verdict_reply {
        add_tokens(&mut stats, &reply);
    }
    stats.classification_ms = ms;

    // ── Stage 2: Analyzing ───────────────────────────────────────────────
    let (summary, ms) = run_stage(
        cb,
        Stage::Analyzing,
        llm::summarize(agents.summarizer.as_ref(), &text),
    )
    .await?;
    add_tokens(&mut stats, &summary);
    stats.summary_ms = ms;

    // ── Stage 3: Generating ──────────────────────────────────────────────
    let ((raw, markup), ms) = run_stage(cb, Stage::Generating, async {
        let raw = llm::describe(agents.describer.as_ref(), &summary.content).await?;
        let markup = normalize::normalize(&raw.content);
        validate::validate(&markup)?;
        Ok::<_, LexiGraphError>((raw, markup))
    })
    .await?;
    add_tokens(&mut stats, &raw);
    stats.describe_ms = ms;
    stats.normalization_delta = markup.len() as i64 - raw.content.len() as i64;

    // ── Stage 4: Rendering ───────────────────────────────────────────────
    let ((render_url, image), ms) =
        run_stage(cb, Stage::Rendering, render(&markup, config)).await?;
    stats.render_ms = ms;
    stats.image_bytes = image.as_ref().map_or(0, |i| i.bytes.len());
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Graph complete: {} chars of markup, {} in / {} out tokens, {}ms total",
        markup.len(),
        stats.total_input_tokens,
        stats.total_output_tokens,
        stats.total_duration_ms
    );
    cb.on_pipeline_complete(stats.total_duration_ms);

    Ok(GraphOutput {
        summary: summary.content,
        markup,
        raw_markup: raw.content,
        render_url,
        image,
        stats,
    })
}

/// Normalize, validate and render markup that did not come from the describer.
///
/// No model is called; the summary is left empty.
pub async fn render_markup(
    raw: impl AsRef<str>,
    config: &GraphConfig,
) -> Result<GraphOutput, LexiGraphError> {
    let total_start = Instant::now();
    let raw = raw.as_ref();
    let markup = normalize::normalize(raw);
    validate::validate(&markup)?;
    let (render_url, image) = render(&markup, config).await?;
    let total_ms = total_start.elapsed().as_millis() as u64;

    Ok(GraphOutput {
        summary: String::new(),
        raw_markup: raw.to_string(),
        render_url,
        stats: GraphStats {
            render_ms: total_ms,
            total_duration_ms: total_ms,
            normalization_delta: markup.len() as i64 - raw.len() as i64,
            image_bytes: image.as_ref().map_or(0, |i| i.bytes.len()),
            ..Default::default()
        },
        markup,
        image,
    })
}

/// Generate a graph and write the image to `output_path`.
///
/// The image is always fetched, whatever `config.fetch_image` says. Uses an
/// atomic write (temp file + rename) so no partial image is left behind.
pub async fn generate_to_file(
    text: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &GraphConfig,
) -> Result<GraphOutput, LexiGraphError> {
    let mut config = config.clone();
    config.fetch_image = true;
    let output = generate(text, &config).await?;
    let image = output
        .image
        .as_ref()
        .ok_or_else(|| LexiGraphError::Internal("render returned no image".into()))?;
    storage::write_atomic(output_path.as_ref(), &image.bytes).await?;
    Ok(output)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    text: impl AsRef<str>,
    config: &GraphConfig,
) -> Result<GraphOutput, LexiGraphError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LexiGraphError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(text, config))
}

// ── Agent resolution ─────────────────────────────────────────────────────

/// Build the three role agents from `config`.
///
/// A per-request `api_key` wins: calls then go straight to the named
/// provider's HTTP API. Otherwise an `edgequake_llm` provider is resolved
/// with [`resolve_provider`].
pub fn resolve_agents(config: &GraphConfig) -> Result<Agents, LexiGraphError> {
    if let (Some(key), Some(name)) = (config.api_key.as_deref(), config.provider_name.as_deref()) {
        input::validate_api_key(name, key)?;
        return Agents::from_api_key(name, key, config);
    }
    let (provider, label) = resolve_provider(config)?;
    Ok(Agents::from_provider(provider, &label, config))
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LexiGraphError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LexiGraphError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is. Useful in
///    tests or when the caller wraps the provider in middleware.
///
/// 2. **Named provider** (`config.provider_name`): built with
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key from the environment. Without `config.model` the provider's
///    catalog default is used.
///
/// 3. **Environment pair** (`LEXIGRAPH_PROVIDER` + `LEXIGRAPH_MODEL`): both
///    set means the deployment chose a provider and model; honoured even
///    when several API keys are present.
///
/// 4. **OpenAI key present**: prefer OpenAI when `OPENAI_API_KEY` is set.
///
/// 5. **Full auto-detection** ([`ProviderFactory::from_env`]).
///
/// Returns the provider with a label for logs and errors.
pub fn resolve_provider(
    config: &GraphConfig,
) -> Result<(Arc<dyn LLMProvider>, String), LexiGraphError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        let label = config.provider_name.clone().unwrap_or_else(|| "custom".into());
        return Ok((Arc::clone(provider), label));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .or_else(|| input::default_model(name))
            .unwrap_or(FALLBACK_MODEL);
        return Ok((create_provider(name, model)?, name.clone()));
    }

    // 3) Deployment-level pair
    if let (Ok(prov), Ok(model)) = (
        std::env::var("LEXIGRAPH_PROVIDER"),
        std::env::var("LEXIGRAPH_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok((create_provider(&prov, &model)?, prov));
        }
    }

    // 4) OpenAI key present
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(FALLBACK_MODEL);
            return Ok((create_provider("openai", model)?, "openai".into()));
        }
    }

    // 5) Whatever the environment offers
    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LexiGraphError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, "auto".into()))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run one stage, timing it and reporting start, completion or failure.
async fn run_stage<T, F>(
    cb: &dyn PipelineProgressCallback,
    stage: Stage,
    work: F,
) -> Result<(T, u64), LexiGraphError>
where
    F: Future<Output = Result<T, LexiGraphError>>,
{
    info!("[{}/4] {}", stage.step(), stage.message());
    cb.on_stage_start(stage, stage.message());
    let start = Instant::now();
    match work.await {
        Ok(value) => {
            let ms = start.elapsed().as_millis() as u64;
            debug!("Stage {} finished in {}ms", stage, ms);
            cb.on_stage_complete(stage, ms);
            Ok((value, ms))
        }
        Err(e) => {
            warn!("Stage {} failed: {}", stage, e);
            cb.on_pipeline_error(stage, &e.to_string());
            Err(e)
        }
    }
}

/// Probe and/or fetch as configured. Always returns the render URL.
async fn render(
    markup: &str,
    config: &GraphConfig,
) -> Result<(String, Option<crate::pipeline::render::RenderedImage>), LexiGraphError> {
    let service = RenderService::from_config(config)?;
    let url = service.render_url(markup);
    if config.probe_render {
        service.probe(markup).await?;
    }
    let image = if config.fetch_image {
        Some(service.fetch(markup).await?)
    } else {
        None
    };
    Ok((url, image))
}

fn add_tokens(stats: &mut GraphStats, reply: &AgentReply) {
    stats.total_input_tokens += reply.input_tokens as u64;
    stats.total_output_tokens += reply.output_tokens as u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::ChatAgent;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies by role, recognised from the prompt text.
    struct Scripted {
        verdict: &'static str,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ChatAgent for Scripted {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, prompt: &str) -> Result<AgentReply, LexiGraphError> {
            let (role, content) = if prompt.contains("VALID or INVALID") {
                ("classify", self.verdict.to_string())
            } else if prompt.contains("Lecture:") {
                ("summarize", "Topic:\n- Part".to_string())
            } else {
                ("describe", "```dot\ndigraph G { A -> B; }\n```".to_string())
            };
            self.calls.lock().unwrap().push(role);
            Ok(AgentReply {
                content,
                input_tokens: 5,
                output_tokens: 1,
            })
        }
    }

    fn offline_config() -> GraphConfig {
        GraphConfig::builder()
            .probe_render(false)
            .fetch_image(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn rejected_text_never_reaches_summarizer() {
        let agent = Arc::new(Scripted {
            verdict: "INVALID",
            calls: Mutex::new(Vec::new()),
        });
        let agents = Agents::uniform(agent.clone());
        let err = generate_with_agents("x".repeat(80), &agents, &offline_config())
            .await
            .unwrap_err();
        assert!(matches!(err, LexiGraphError::ClassificationRejected));
        assert_eq!(*agent.calls.lock().unwrap(), vec!["classify"]);
    }

    #[tokio::test]
    async fn offline_run_returns_url_without_image() {
        let agent = Arc::new(Scripted {
            verdict: "VALID",
            calls: Mutex::new(Vec::new()),
        });
        let out = generate_with_agents("y".repeat(80), &Agents::uniform(agent), &offline_config())
            .await
            .unwrap();
        assert_eq!(out.markup, "digraph G { A -> B; }");
        assert!(out.render_url.contains("format=png"));
        assert!(out.image.is_none());
        assert_eq!(out.stats.total_input_tokens, 15);
        assert_eq!(out.stats.provider, "scripted");
    }

    #[tokio::test]
    async fn short_text_fails_before_any_call() {
        let agent = Arc::new(Scripted {
            verdict: "VALID",
            calls: Mutex::new(Vec::new()),
        });
        let err = generate_with_agents("short", &Agents::uniform(agent.clone()), &offline_config())
            .await
            .unwrap_err();
        assert!(matches!(err, LexiGraphError::InputTooShort { .. }));
        assert!(agent.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn render_markup_rejects_invalid_markup() {
        let err = render_markup("no graph here", &offline_config())
            .await
            .unwrap_err();
        assert!(matches!(err, LexiGraphError::InvalidMarkup(_)));

        let out = render_markup("Here's the DOT code: digraph G { a; }", &offline_config())
            .await
            .unwrap();
        assert_eq!(out.markup, "digraph G { a; }");
        assert!(out.stats.normalization_delta < 0);
    }

    #[test]
    fn api_key_with_wrong_prefix_is_rejected_before_any_call() {
        let config = GraphConfig::builder()
            .provider_name("anthropic")
            .api_key("sk-not-anthropic")
            .build()
            .unwrap();
        let err = resolve_agents(&config).unwrap_err();
        assert!(matches!(err, LexiGraphError::InvalidApiKey { .. }));
    }
}
