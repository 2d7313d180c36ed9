//! Direct HTTP chat client for requests that bring their own API key.
//!
//! ## Why not reuse the provider factory?
//!
//! `edgequake_llm::ProviderFactory` reads credentials from environment
//! variables. A web request carrying its own key would have to write that
//! key into the process environment first, and two concurrent requests with
//! different keys would race. This client takes the key as a value, so each
//! request owns its credentials and nothing global is touched.
//!
//! Two wire formats cover the supported providers:
//!
//! * OpenAI chat completions: `openai`, `openrouter`
//! * Anthropic messages: `anthropic`

use super::input::default_model;
use super::llm::{AgentReply, Agents, ChatAgent};
use crate::config::GraphConfig;
use crate::error::{classify_provider_error, LexiGraphError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request/response shape spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    OpenAiChat,
    AnthropicMessages,
}

/// Endpoint and wire format for a provider name.
pub fn endpoint_for(provider: &str) -> Option<(&'static str, WireFormat)> {
    match provider {
        "openai" => Some((OPENAI_URL, WireFormat::OpenAiChat)),
        "openrouter" => Some((OPENROUTER_URL, WireFormat::OpenAiChat)),
        "anthropic" => Some((ANTHROPIC_URL, WireFormat::AnthropicMessages)),
        _ => None,
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

/// Pull the reply text and token counts out of a successful response body.
fn parse_reply(format: WireFormat, body: &str) -> Result<AgentReply, String> {
    match format {
        WireFormat::OpenAiChat => {
            let r: OpenAiResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
            let content = r
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| "response has no choices".to_string())?;
            let usage = r.usage.unwrap_or(OpenAiUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
            });
            Ok(AgentReply {
                content,
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
        }
        WireFormat::AnthropicMessages => {
            let r: AnthropicResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
            let content: String = r
                .content
                .into_iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text)
                .collect();
            let (input_tokens, output_tokens) = r
                .usage
                .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
            Ok(AgentReply {
                content,
                input_tokens,
                output_tokens,
            })
        }
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// A [`ChatAgent`] that calls a provider's HTTP API with an explicit key.
#[derive(Clone)]
pub struct HttpChatAgent {
    client: reqwest::Client,
    provider: String,
    url: String,
    format: WireFormat,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl HttpChatAgent {
    /// Create an agent for one of the supported providers.
    ///
    /// `client` should carry no timeout of its own; `timeout_secs` is
    /// applied per request.
    pub fn new(
        client: reqwest::Client,
        provider: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
        timeout_secs: u64,
    ) -> Result<Self, LexiGraphError> {
        let provider = provider.trim().to_ascii_lowercase();
        let (url, format) = endpoint_for(&provider)
            .ok_or_else(|| LexiGraphError::UnsupportedProvider(provider.clone()))?;
        Ok(Self {
            client,
            provider,
            url: url.to_string(),
            format,
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            max_tokens,
            timeout_secs,
        })
    }

    /// Send requests to `url` instead of the provider's public endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let builder = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body);
        match self.format {
            WireFormat::OpenAiChat => builder.bearer_auth(&self.api_key),
            WireFormat::AnthropicMessages => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> LexiGraphError {
        if e.is_timeout() {
            LexiGraphError::ApiTimeout {
                provider: self.provider.clone(),
                secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            LexiGraphError::ConnectionFailed {
                provider: self.provider.clone(),
                detail: e.to_string(),
            }
        } else {
            classify_provider_error(&self.provider, &e.to_string())
        }
    }
}

#[async_trait]
impl ChatAgent for HttpChatAgent {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn invoke(&self, prompt: &str) -> Result<AgentReply, LexiGraphError> {
        debug!("POST {} (model {})", self.url, self.model);
        let response = self
            .request(prompt)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("{}: HTTP {}", self.provider, status.as_u16());
            return Err(classify_provider_error(
                &self.provider,
                &format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        parse_reply(self.format, &body).map_err(|detail| LexiGraphError::LlmApiError {
            provider: self.provider.clone(),
            detail: format!("Unreadable response: {detail}"),
        })
    }
}

impl fmt::Debug for HttpChatAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChatAgent")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Agents {
    /// Build all three roles as direct HTTP agents sharing one client.
    ///
    /// Uses `config.model`, or the provider's default model when unset.
    pub fn from_api_key(
        provider: &str,
        api_key: &str,
        config: &GraphConfig,
    ) -> Result<Self, LexiGraphError> {
        let model = match config.model.as_deref() {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => default_model(provider)
                .ok_or_else(|| LexiGraphError::UnsupportedProvider(provider.to_string()))?
                .to_string(),
        };
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LexiGraphError::Internal(format!("HTTP client: {e}")))?;

        let agent = |max_tokens| -> Result<Arc<dyn ChatAgent>, LexiGraphError> {
            let agent: Arc<dyn ChatAgent> = Arc::new(HttpChatAgent::new(
                client.clone(),
                provider,
                api_key,
                model.clone(),
                config.temperature,
                max_tokens,
                config.api_timeout_secs,
            )?);
            Ok(agent)
        };
        Ok(Self {
            classifier: agent(config.classifier_max_tokens)?,
            summarizer: agent(config.summarizer_max_tokens)?,
            describer: agent(config.describer_max_tokens)?,
        })
    }
}
