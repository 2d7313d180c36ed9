//! Error types for the lexigraph library.
//!
//! Two error types reflect two different layers:
//!
//! * [`MarkupError`]: the structural validator rejected the normalized DOT
//!   text. It is produced by a pure function and carries no I/O context.
//!
//! * [`LexiGraphError`]: **Fatal** for one request: the classifier rejected
//!   the text, a provider call failed, the markup was invalid, or the render
//!   service refused it. Every stage fails closed, so callers only ever see a
//!   complete diagram or one of these.
//!
//! Provider failures arrive as free-form strings from whatever client made
//! the call. [`classify_provider_error`] maps them once, at the orchestrator
//! boundary, onto a small set of variants with user-facing wording.

use std::path::PathBuf;
use thiserror::Error;

/// Why a piece of markup failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum MarkupError {
    /// Nothing left after trimming.
    #[error("DOT code is empty")]
    EmptyMarkup,

    /// Does not start with `graph` or `digraph`.
    #[error("DOT code must start with 'digraph' or 'graph'")]
    MissingKeyword,

    /// `{` and `}` counts differ.
    #[error("Unbalanced braces: {open} opening, {close} closing")]
    UnbalancedBraces { open: usize, close: usize },
}

/// All fatal errors returned by the lexigraph library.
#[derive(Debug, Error)]
pub enum LexiGraphError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The submitted text was empty or whitespace.
    #[error("Please enter some lecture content to process.")]
    EmptyInput,

    /// The submitted text is shorter than the configured minimum.
    #[error("Please enter at least {min} characters of lecture content (got {actual}).")]
    InputTooShort { min: usize, actual: usize },

    /// A per-request API key is missing or has the wrong prefix.
    #[error("Invalid {provider} API key: {reason}")]
    InvalidApiKey { provider: String, reason: String },

    /// Provider name is not one we know how to talk to.
    #[error("Unsupported provider: '{0}'")]
    UnsupportedProvider(String),

    // ── Classification ────────────────────────────────────────────────────
    /// The classifier judged the text as non-educational.
    #[error(
        "Invalid content type detected. Please provide educational content such as lectures, \
tutorials, or informational articles suitable for creating knowledge graphs."
    )]
    ClassificationRejected,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No provider could be resolved (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Provider rejected the credentials (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// Provider returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded { provider: String, detail: String },

    /// The call did not finish within `api_timeout_secs`.
    #[error("LLM call to '{provider}' timed out after {secs}s")]
    ApiTimeout { provider: String, secs: u64 },

    /// Prompt plus completion did not fit the model's window.
    #[error("Input too long for model on provider '{provider}': {detail}")]
    ContextLengthExceeded { provider: String, detail: String },

    /// The provider endpoint could not be reached at all.
    #[error("Could not connect to provider '{provider}': {detail}")]
    ConnectionFailed { provider: String, detail: String },

    /// Any other provider-side failure.
    #[error("LLM API error from '{provider}': {detail}")]
    LlmApiError { provider: String, detail: String },

    // ── Markup errors ─────────────────────────────────────────────────────
    /// Normalized markup failed structural validation.
    #[error("Unable to generate a valid diagram: {0}")]
    InvalidMarkup(#[from] MarkupError),

    // ── Render errors ─────────────────────────────────────────────────────
    /// The render service answered with a non-200 status or could not be reached.
    #[error("Rendering failed{}: {detail}", status_suffix(.status))]
    RenderFailed { status: Option<u16>, detail: String },

    /// The render call exceeded `render_timeout_secs`.
    #[error("Render service timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl LexiGraphError {
    /// Short, category-level message suitable for showing to an end user.
    ///
    /// The full `Display` output keeps provider details; this does not.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput | Self::InputTooShort { .. } => "Please provide more lecture content.",
            Self::InvalidApiKey { .. } | Self::AuthError { .. } => {
                "Authentication failed - check your API key."
            }
            Self::UnsupportedProvider(_) | Self::ProviderNotConfigured { .. } => {
                "The selected AI provider is not available."
            }
            Self::ClassificationRejected => {
                "Content validation failed - please provide educational content."
            }
            Self::RateLimitExceeded { .. } => "Rate limit reached - please wait and try again.",
            Self::ApiTimeout { .. } => "The AI provider took too long to respond - please try again.",
            Self::ContextLengthExceeded { .. } => "The text is too long for the selected model.",
            Self::ConnectionFailed { .. } => "Connection error - could not reach the AI provider.",
            Self::LlmApiError { .. } => "Failed to analyze content - please try again.",
            Self::InvalidMarkup(_) => "Unable to generate a valid diagram.",
            Self::RenderFailed { .. } | Self::RenderTimeout { .. } => "Failed to render the graph.",
            Self::OutputWriteFailed { .. } | Self::InvalidConfig(_) | Self::Internal(_) => {
                "Unexpected error - please try again."
            }
        }
    }
}

/// Map a provider's error text onto a [`LexiGraphError`] variant.
///
/// Matching is by case-insensitive substring, most specific first. Anything
/// unrecognised becomes [`LexiGraphError::LlmApiError`] with the text intact.
pub fn classify_provider_error(provider: &str, detail: &str) -> LexiGraphError {
    let lower = detail.to_lowercase();
    let provider = provider.to_string();
    let detail = detail.to_string();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["401", "403", "unauthorized", "forbidden", "api key", "api_key", "authentication", "permission denied"]) {
        LexiGraphError::AuthError { provider, detail }
    } else if has(&["429", "rate limit", "rate_limit", "too many requests", "quota"]) {
        LexiGraphError::RateLimitExceeded { provider, detail }
    } else if has(&["context length", "context_length", "maximum context", "too many tokens", "prompt is too long"]) {
        LexiGraphError::ContextLengthExceeded { provider, detail }
    } else if has(&["timed out", "timeout"]) {
        LexiGraphError::ApiTimeout { provider, secs: 0 }
    } else if has(&["connection refused", "failed to connect", "connection reset", "dns error", "error trying to connect"]) {
        LexiGraphError::ConnectionFailed { provider, detail }
    } else {
        LexiGraphError::LlmApiError { provider, detail }
    }
}
