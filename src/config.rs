//! Configuration types for text-to-graph generation.
//!
//! All generation behaviour is controlled through [`GraphConfig`], built via
//! its [`GraphConfigBuilder`]. Keeping every knob in one struct makes it easy
//! to share configs across requests, print them for debugging, and diff two
//! runs to understand why their diagrams differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::LexiGraphError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default render endpoint: QuickChart's hosted Graphviz renderer.
pub const DEFAULT_RENDER_URL: &str = "https://quickchart.io/graphviz";

/// Configuration for one text-to-graph generation.
///
/// Built via [`GraphConfig::builder()`] or using [`GraphConfig::default()`].
///
/// # Example
/// ```rust
/// use lexigraph::GraphConfig;
///
/// let config = GraphConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4o-mini")
///     .render_timeout_secs(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GraphConfig {
    /// Model identifier, e.g. "gpt-4o-mini", "claude-3-5-haiku-20241022".
    /// If None, the provider default is used.
    pub model: Option<String>,

    /// Provider name ("openai", "anthropic", "openrouter", "ollama", ...).
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// API key sent with every call instead of the environment's key.
    ///
    /// Requires `provider_name`. Calls then go straight over HTTP to that
    /// provider, so concurrent requests with different keys never share
    /// process-wide state.
    pub api_key: Option<String>,

    /// Sampling temperature for all three roles. Default: 0.1.
    ///
    /// The classifier must answer with one word and the describer must emit
    /// parseable markup; both degrade quickly as temperature rises.
    pub temperature: f32,

    /// Completion budget for the classifier. Default: 1000.
    pub classifier_max_tokens: usize,

    /// Completion budget for the summarizer. Default: 12000.
    ///
    /// Long lectures produce deep hierarchies; a tight budget truncates the
    /// summary and the graph silently loses branches.
    pub summarizer_max_tokens: usize,

    /// Completion budget for the describer. Default: 12000.
    pub describer_max_tokens: usize,

    /// Per-call timeout for model requests in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Render service endpoint. Default: [`DEFAULT_RENDER_URL`].
    pub render_base_url: String,

    /// Image format requested from the render service. Default: PNG.
    pub image_format: ImageFormat,

    /// Timeout for each render request in seconds. Default: 10.
    pub render_timeout_secs: u64,

    /// Send a HEAD request first so syntax errors surface before the image
    /// is downloaded. Default: true.
    pub probe_render: bool,

    /// Download the rendered image. When false only the render URL is
    /// returned. Default: true.
    pub fetch_image: bool,

    /// Minimum input length in characters after trimming. Default: 50.
    pub min_input_chars: usize,

    /// Skip the content classifier. Default: false.
    pub skip_classification: bool,

    /// Directory for rendered images written by the CLI and HTTP server.
    /// Default: `output`.
    pub output_dir: PathBuf,

    /// Images older than this are removed before each server request.
    /// Default: 24.
    pub max_age_hours: u64,

    /// Optional stage-event callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            api_key: None,
            temperature: 0.1,
            classifier_max_tokens: 1000,
            summarizer_max_tokens: 12000,
            describer_max_tokens: 12000,
            api_timeout_secs: 60,
            render_base_url: DEFAULT_RENDER_URL.to_string(),
            image_format: ImageFormat::default(),
            render_timeout_secs: 10,
            probe_render: true,
            fetch_image: true,
            min_input_chars: 50,
            skip_classification: false,
            output_dir: PathBuf::from("output"),
            max_age_hours: 24,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("classifier_max_tokens", &self.classifier_max_tokens)
            .field("summarizer_max_tokens", &self.summarizer_max_tokens)
            .field("describer_max_tokens", &self.describer_max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("render_base_url", &self.render_base_url)
            .field("image_format", &self.image_format)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("probe_render", &self.probe_render)
            .field("fetch_image", &self.fetch_image)
            .field("min_input_chars", &self.min_input_chars)
            .field("skip_classification", &self.skip_classification)
            .field("output_dir", &self.output_dir)
            .field("max_age_hours", &self.max_age_hours)
            .finish()
    }
}

impl GraphConfig {
    /// Create a new builder for `GraphConfig`.
    pub fn builder() -> GraphConfigBuilder {
        GraphConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GraphConfig`].
#[derive(Debug)]
pub struct GraphConfigBuilder {
    config: GraphConfig,
}

impl GraphConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn classifier_max_tokens(mut self, n: usize) -> Self {
        self.config.classifier_max_tokens = n;
        self
    }

    pub fn summarizer_max_tokens(mut self, n: usize) -> Self {
        self.config.summarizer_max_tokens = n;
        self
    }

    pub fn describer_max_tokens(mut self, n: usize) -> Self {
        self.config.describer_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn render_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.render_base_url = url.into();
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn probe_render(mut self, v: bool) -> Self {
        self.config.probe_render = v;
        self
    }

    pub fn fetch_image(mut self, v: bool) -> Self {
        self.config.fetch_image = v;
        self
    }

    pub fn min_input_chars(mut self, n: usize) -> Self {
        self.config.min_input_chars = n;
        self
    }

    pub fn skip_classification(mut self, v: bool) -> Self {
        self.config.skip_classification = v;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_age_hours(mut self, hours: u64) -> Self {
        self.config.max_age_hours = hours;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GraphConfig, LexiGraphError> {
        let c = &self.config;
        if c.classifier_max_tokens == 0 || c.summarizer_max_tokens == 0 || c.describer_max_tokens == 0
        {
            return Err(LexiGraphError::InvalidConfig(
                "Token limits must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(LexiGraphError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if reqwest::Url::parse(&c.render_base_url).is_err() {
            return Err(LexiGraphError::InvalidConfig(format!(
                "Render URL is not a valid URL: '{}'",
                c.render_base_url
            )));
        }
        if c.api_key.is_some() && c.provider_name.is_none() {
            return Err(LexiGraphError::InvalidConfig(
                "An API key needs a provider name".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image format requested from the render service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Raster image (default). Opens everywhere.
    #[default]
    Png,
    /// Vector image. Stays sharp when zoomed; large graphs stay readable.
    Svg,
}

impl ImageFormat {
    /// Value of the render service's `format` parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = LexiGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(LexiGraphError::InvalidConfig(format!(
                "Unknown image format '{other}' (expected png or svg)"
            ))),
        }
    }
}
