//! Model interaction: the three agent roles behind one small trait.
//!
//! The pipeline makes three chat calls per request, each with a single user
//! message built from a template in [`crate::prompts`]:
//!
//! | Role       | Input        | Output                     | Budget |
//! |------------|--------------|----------------------------|--------|
//! | classifier | lecture text | `VALID` / `INVALID`        | 1 000  |
//! | summarizer | lecture text | indented hierarchy         | 12 000 |
//! | describer  | summary      | raw DOT markup (untrusted) | 12 000 |
//!
//! ## Why a `ChatAgent` seam?
//!
//! Two different clients sit behind it: [`ProviderAgent`] wraps an
//! `edgequake_llm` provider configured from the environment, and
//! [`super::http_agent::HttpChatAgent`] calls a provider directly with a
//! per-request API key. Tests plug in canned agents and never touch the
//! network. The orchestrator only sees [`Agents`].
//!
//! Calls are made once. A failed call is mapped onto a
//! [`LexiGraphError`] variant and returned; nothing retries.

use crate::config::GraphConfig;
use crate::error::{classify_provider_error, LexiGraphError};
use crate::prompts::{
    fill_template, CLASSIFIER_PROMPT, DESCRIBER_PROMPT, INPUT_PLACEHOLDER, LECTURE_PLACEHOLDER,
    SUMMARIZER_PROMPT, SUMMARY_PLACEHOLDER,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One completed chat call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Something that answers a single-turn prompt.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Provider name used in error messages and logs.
    fn provider(&self) -> &str;

    /// Send `prompt` as one user message and return the reply.
    async fn invoke(&self, prompt: &str) -> Result<AgentReply, LexiGraphError>;
}

// ── edgequake-llm backed agent ──────────────────────────────────────────────

/// A [`ChatAgent`] over an `edgequake_llm` provider.
pub struct ProviderAgent {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl ProviderAgent {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
        timeout_secs: u64,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature,
            max_tokens,
            timeout_secs,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChatAgent for ProviderAgent {
    fn provider(&self) -> &str {
        &self.label
    }

    async fn invoke(&self, prompt: &str) -> Result<AgentReply, LexiGraphError> {
        let messages = vec![ChatMessage::user(prompt)];
        let options = self.options();
        let call = self.provider.chat(&messages, Some(&options));

        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Err(_) => {
                warn!("{}: no reply within {}s", self.label, self.timeout_secs);
                Err(LexiGraphError::ApiTimeout {
                    provider: self.label.clone(),
                    secs: self.timeout_secs,
                })
            }
            Ok(Err(e)) => {
                let detail = e.to_string();
                warn!("{}: call failed: {}", self.label, detail);
                Err(classify_provider_error(&self.label, &detail))
            }
            Ok(Ok(response)) => Ok(AgentReply {
                content: response.content,
                input_tokens: response.prompt_tokens as usize,
                output_tokens: response.completion_tokens as usize,
            }),
        }
    }
}

impl fmt::Debug for ProviderAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAgent")
            .field("provider", &self.label)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── The three roles ─────────────────────────────────────────────────────────

/// One agent per role. Cheap to clone.
#[derive(Clone)]
pub struct Agents {
    pub classifier: Arc<dyn ChatAgent>,
    pub summarizer: Arc<dyn ChatAgent>,
    pub describer: Arc<dyn ChatAgent>,
}

impl Agents {
    /// Build all three roles over one provider, each with its own token budget.
    pub fn from_provider(
        provider: Arc<dyn LLMProvider>,
        label: &str,
        config: &GraphConfig,
    ) -> Self {
        let agent = |max_tokens| -> Arc<dyn ChatAgent> {
            Arc::new(ProviderAgent::new(
                Arc::clone(&provider),
                label,
                config.temperature,
                max_tokens,
                config.api_timeout_secs,
            ))
        };
        Self {
            classifier: agent(config.classifier_max_tokens),
            summarizer: agent(config.summarizer_max_tokens),
            describer: agent(config.describer_max_tokens),
        }
    }

    /// Use the same agent for every role.
    pub fn uniform(agent: Arc<dyn ChatAgent>) -> Self {
        Self {
            classifier: Arc::clone(&agent),
            summarizer: Arc::clone(&agent),
            describer: agent,
        }
    }
}

impl fmt::Debug for Agents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agents")
            .field("classifier", &self.classifier.provider())
            .field("summarizer", &self.summarizer.provider())
            .field("describer", &self.describer.provider())
            .finish()
    }
}

/// The classifier's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentVerdict {
    Valid,
    Invalid,
}

/// Read the classifier reply: anything mentioning `INVALID` rejects.
///
/// Models sometimes answer "INVALID." or "The content is INVALID"; a
/// substring match tolerates both. An answer that never says INVALID is
/// accepted, so a chatty but positive reply does not block the user.
pub fn parse_verdict(reply: &str) -> ContentVerdict {
    if reply.trim().to_uppercase().contains("INVALID") {
        ContentVerdict::Invalid
    } else {
        ContentVerdict::Valid
    }
}

/// Ask the classifier whether `text` is educational.
pub async fn classify(
    agent: &dyn ChatAgent,
    text: &str,
) -> Result<(ContentVerdict, AgentReply), LexiGraphError> {
    let prompt = fill_template(CLASSIFIER_PROMPT, INPUT_PLACEHOLDER, text);
    let reply = agent.invoke(&prompt).await?;
    let verdict = parse_verdict(&reply.content);
    debug!(
        "Classifier ({}) answered {:?} → {:?}",
        agent.provider(),
        reply.content.trim(),
        verdict
    );
    Ok((verdict, reply))
}

/// Produce the hierarchical summary of `text`.
pub async fn summarize(agent: &dyn ChatAgent, text: &str) -> Result<AgentReply, LexiGraphError> {
    let prompt = fill_template(SUMMARIZER_PROMPT, LECTURE_PLACEHOLDER, text);
    let reply = agent.invoke(&prompt).await?;
    debug!(
        "Summary: {} chars, {} input tokens, {} output tokens",
        reply.content.len(),
        reply.input_tokens,
        reply.output_tokens
    );
    Ok(reply)
}

/// Turn a summary into raw (not yet normalized) markup.
pub async fn describe(agent: &dyn ChatAgent, summary: &str) -> Result<AgentReply, LexiGraphError> {
    let prompt = fill_template(DESCRIBER_PROMPT, SUMMARY_PLACEHOLDER, summary);
    let reply = agent.invoke(&prompt).await?;
    debug!(
        "Raw markup: {} chars, {} output tokens",
        reply.content.len(),
        reply.output_tokens
    );
    Ok(reply)
}
