//! Pipeline stages for text-to-graph generation.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets us swap implementations (e.g. a
//! different chat client) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ llm ──────────────────────▶ normalize ──▶ validate ──▶ render
//! (checks)  (classify/summarize/describe) (cleanup)    (gate)      (HTTP)
//! ```
//!
//! 1. [`input`]    : reject short text and malformed API keys locally
//! 2. [`llm`]      : the three agent roles behind the [`llm::ChatAgent`] seam;
//!    [`http_agent`] supplies the per-request-key client
//! 3. [`normalize`]: deterministic cleanup of the describer's untrusted
//!    output, built on the quote-aware [`scan`]ner
//! 4. [`validate`] : structural gate before any network call
//! 5. [`render`]   : the hosted Graphviz service; the only stage besides
//!    `llm` with network I/O

pub mod http_agent;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
pub mod scan;
pub mod validate;
