//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::GraphConfigBuilder::progress_callback`] to receive events
//! as a request moves through classification, summarization, description and
//! rendering.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a terminal spinner, a log line or a web socket without
//! the library knowing anything about how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use lexigraph::{GraphConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: Stage, message: &str) {
//!         eprintln!("[{}] {}", stage, message);
//!     }
//! }
//!
//! let config = GraphConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The four user-visible pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Classifier checks the content type.
    Validating,
    /// Summarizer builds the hierarchical summary.
    Analyzing,
    /// Describer writes the markup; normalization and validation follow.
    Generating,
    /// Render service turns the markup into an image.
    Rendering,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Validating,
        Stage::Analyzing,
        Stage::Generating,
        Stage::Rendering,
    ];

    /// Default status line shown when the stage starts.
    pub fn message(self) -> &'static str {
        match self {
            Stage::Validating => "Checking content type...",
            Stage::Analyzing => "Summarizing content...",
            Stage::Generating => "Creating graph markup...",
            Stage::Rendering => "Rendering graph...",
        }
    }

    /// 1-based position, for "step n of 4" displays.
    pub fn step(self) -> usize {
        match self {
            Stage::Validating => 1,
            Stage::Analyzing => 2,
            Stage::Generating => 3,
            Stage::Rendering => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Rendering => "rendering",
        };
        f.write_str(s)
    }
}

/// Called by the orchestrator as it moves through each [`Stage`].
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run one after another, so events for one
/// request never interleave.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called just before a stage begins.
    fn on_stage_start(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once after the last stage succeeds.
    fn on_pipeline_complete(&self, total_ms: u64) {
        let _ = total_ms;
    }

    /// Called when a stage fails; no further events follow.
    fn on_pipeline_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GraphConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage, _message: &str) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_pipeline_error(&self, stage: Stage, error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("error:{stage}:{error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Validating, "x");
        cb.on_stage_complete(Stage::Validating, 3);
        cb.on_pipeline_error(Stage::Rendering, "boom");
        cb.on_pipeline_complete(10);
    }

    #[test]
    fn recorder_sees_overridden_events_only() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Validating, "");
        rec.on_stage_complete(Stage::Validating, 5);
        rec.on_pipeline_error(Stage::Analyzing, "rate limit");
        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start:validating", "error:analyzing:rate limit"]
        );
    }

    #[test]
    fn stages_are_ordered() {
        let steps: Vec<usize> = Stage::ALL.iter().map(|s| s.step()).collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);
        assert_eq!(
            serde_json::to_string(&Stage::Generating).unwrap(),
            "\"generating\""
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Rendering, Stage::Rendering.message());
    }
}
