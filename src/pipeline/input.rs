//! Input validation: reject text and credentials before any model is called.
//!
//! ## Why validate locally?
//!
//! Every model call costs money and seconds. A two-word input or an API key
//! pasted into the wrong provider field fails on the provider side anyway,
//! but only after a round trip and with an error message that is hard to
//! read. Checking here gives the user an immediate, specific answer.
//!
//! The provider catalog lives here too: the set of providers whose keys we
//! can check is the set the HTTP front end offers.

use crate::error::LexiGraphError;
use tracing::debug;

/// Providers that accept a per-request API key.
pub const SUPPORTED_PROVIDERS: [&str; 3] = ["anthropic", "openai", "openrouter"];

/// Check that `text` has at least `min_chars` characters after trimming.
///
/// Characters, not bytes: an Arabic lecture is not penalised for using
/// two-byte code points.
pub fn validate_input_text(text: &str, min_chars: usize) -> Result<&str, LexiGraphError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LexiGraphError::EmptyInput);
    }
    let actual = trimmed.chars().count();
    if actual < min_chars {
        return Err(LexiGraphError::InputTooShort {
            min: min_chars,
            actual,
        });
    }
    debug!("Input accepted: {} chars", actual);
    Ok(trimmed)
}

/// Check the shape of an API key for `provider`.
///
/// Only the prefix is checked; whether the key works is the provider's call.
pub fn validate_api_key(provider: &str, api_key: &str) -> Result<(), LexiGraphError> {
    let provider_lc = provider.trim().to_ascii_lowercase();
    let prefix = key_prefix(&provider_lc)
        .ok_or_else(|| LexiGraphError::UnsupportedProvider(provider.to_string()))?;

    let key = api_key.trim();
    if key.is_empty() {
        return Err(LexiGraphError::InvalidApiKey {
            provider: provider_lc,
            reason: "API key is required".into(),
        });
    }
    if !key.starts_with(prefix) {
        return Err(LexiGraphError::InvalidApiKey {
            provider: provider_lc,
            reason: format!("key should start with '{prefix}'"),
        });
    }
    Ok(())
}

/// Prefix every key for `provider` starts with.
fn key_prefix(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("sk-ant-"),
        "openai" => Some("sk-"),
        "openrouter" => Some("sk-or-"),
        _ => None,
    }
}

const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-5-haiku-20241022",
    "claude-3-5-sonnet-20241022",
    "claude-3-opus-20240229",
];

const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

const OPENROUTER_MODELS: &[&str] = &[
    "anthropic/claude-3.5-haiku",
    "anthropic/claude-3.5-sonnet",
    "openai/gpt-4o",
    "google/gemini-pro-1.5",
];

/// Models offered for `provider`, first one is the default.
pub fn available_models(provider: &str) -> Option<&'static [&'static str]> {
    match provider.trim().to_ascii_lowercase().as_str() {
        "anthropic" => Some(ANTHROPIC_MODELS),
        "openai" => Some(OPENAI_MODELS),
        "openrouter" => Some(OPENROUTER_MODELS),
        _ => None,
    }
}

/// Default model for `provider`.
pub fn default_model(provider: &str) -> Option<&'static str> {
    available_models(provider).and_then(|m| m.first().copied())
}
