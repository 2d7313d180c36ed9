//! # lexigraph
//!
//! Turn lecture text into a rendered knowledge graph using LLMs.
//!
//! ## Why this crate?
//!
//! A language model can summarize a lecture into a topic hierarchy and draw
//! that hierarchy as Graphviz DOT, but what comes back is rarely clean: code
//! fences, a chatty preamble, "light" colours used as `color` instead of
//! `fillcolor`, white text on yellow boxes. This crate runs the model calls,
//! then deterministically repairs and checks the markup before a hosted
//! renderer ever sees it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! lecture text
//!  │
//!  ├─ 1. Validate   local length check, then the classifier (VALID/INVALID)
//!  ├─ 2. Analyze    summarizer builds a topic hierarchy
//!  ├─ 3. Generate   describer writes DOT; normalize + structural validate
//!  └─ 4. Render     hosted Graphviz service: HEAD probe, then image bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lexigraph::{generate, GraphConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let config = GraphConfig::default();
//!     let lecture = std::fs::read_to_string("lecture.txt")?;
//!     let output = generate(&lecture, &config).await?;
//!     println!("{}", output.markup);
//!     eprintln!("render: {}", output.render_url);
//!     Ok(())
//! }
//! ```
//!
//! The normalizer is usable on its own and never calls the network:
//!
//! ```rust
//! let raw = "Here's the DOT code:\n```dot\ndigraph G { A [color=lightblue]; }\n```";
//! let markup = lexigraph::normalize(raw);
//! assert!(markup.starts_with("digraph G"));
//! assert!(lexigraph::validate(&markup).is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `lexigraph` binary (clap + anyhow + indicatif + tracing-subscriber + dotenvy) |
//! | `server` | on      | Enables [`server`], the axum HTTP API used by the web front end |
//!
//! Disable both when using only the library:
//! ```toml
//! lexigraph = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GraphConfig, GraphConfigBuilder, ImageFormat};
pub use error::{LexiGraphError, MarkupError};
pub use generate::{
    generate, generate_sync, generate_to_file, generate_with_agents, render_markup,
    resolve_agents,
};
pub use output::{GraphOutput, GraphStats};
pub use pipeline::llm::{AgentReply, Agents, ChatAgent};
pub use pipeline::normalize::normalize;
pub use pipeline::validate::{validate, validation_report};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
