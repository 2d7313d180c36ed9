//! Result types returned by the generation entry points.

use crate::pipeline::render::RenderedImage;
use serde::{Deserialize, Serialize};

/// Everything one successful request produced.
///
/// Serializes to JSON without the image bytes; write those with
/// [`crate::generate_to_file`] or [`crate::storage::write_atomic`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOutput {
    /// Hierarchical summary from the summarizer.
    pub summary: String,
    /// Normalized, validated markup sent to the render service.
    pub markup: String,
    /// Describer output before normalization, kept for debugging.
    pub raw_markup: String,
    /// URL that renders `markup`.
    pub render_url: String,
    /// Downloaded image, when `fetch_image` was enabled.
    #[serde(skip)]
    pub image: Option<RenderedImage>,
    pub stats: GraphStats,
}

/// Timing and token accounting for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Provider that served the calls.
    pub provider: String,
    pub classification_ms: u64,
    pub summary_ms: u64,
    pub describe_ms: u64,
    pub render_ms: u64,
    pub total_duration_ms: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Characters the normalizer removed or added.
    pub normalization_delta: i64,
    pub image_bytes: usize,
}

impl GraphOutput {
    /// The image as a `data:` URI, if one was fetched.
    pub fn image_data_uri(&self) -> Option<String> {
        self.image.as_ref().map(RenderedImage::to_data_uri)
    }
}
