//! Rendering: hand normalized markup to the hosted Graphviz service.
//!
//! ## Why a HEAD probe?
//!
//! The render service answers a syntax error with HTTP 400 and a short text
//! body. Probing with HEAD first surfaces that failure before any image bytes
//! are transferred, and lets callers that only want the URL (the web front
//! end links to it) confirm it will render without downloading it.
//!
//! ## Why fall back to POST?
//!
//! The markup travels URL-encoded in the query string. Large graphs with
//! non-Latin labels triple in size when percent-encoded and can exceed the
//! limits of proxies along the way. Above [`MAX_GET_URL_LEN`] the image is
//! requested with a JSON POST body instead and the HEAD probe is skipped.
//!
//! There is no local fallback renderer and no retry: a failed render is an
//! error for the whole request.

use crate::config::{GraphConfig, ImageFormat};
use crate::error::LexiGraphError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest render URL sent as a GET request.
pub const MAX_GET_URL_LEN: usize = 8 * 1024;

/// Image bytes returned by the render service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub format: ImageFormat,
}

impl RenderedImage {
    /// `data:` URI suitable for an `<img src>` attribute.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.content_type(),
            STANDARD.encode(&self.bytes)
        )
    }

    /// True when the bytes start like the requested format.
    pub fn looks_valid(&self) -> bool {
        match self.format {
            ImageFormat::Png => self.bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            ImageFormat::Svg => {
                let head = &self.bytes[..self.bytes.len().min(512)];
                String::from_utf8_lossy(head).contains("<svg")
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    graph: &'a str,
    format: &'static str,
}

/// Client for the render service.
#[derive(Debug, Clone)]
pub struct RenderService {
    client: reqwest::Client,
    base_url: reqwest::Url,
    format: ImageFormat,
    timeout_secs: u64,
}

impl RenderService {
    pub fn new(
        base_url: &str,
        format: ImageFormat,
        timeout_secs: u64,
    ) -> Result<Self, LexiGraphError> {
        let base_url = reqwest::Url::parse(base_url).map_err(|e| {
            LexiGraphError::InvalidConfig(format!("Render URL '{base_url}': {e}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LexiGraphError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            format,
            timeout_secs,
        })
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self, LexiGraphError> {
        Self::new(
            &config.render_base_url,
            config.image_format,
            config.render_timeout_secs,
        )
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// URL that renders `markup` when fetched.
    pub fn render_url(&self, markup: &str) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("graph", markup)
            .append_pair("format", self.format.as_str());
        url.into()
    }

    /// Ask the service whether it accepts `markup`, without downloading it.
    ///
    /// Returns `Ok(false)` when the URL is too long to probe.
    pub async fn probe(&self, markup: &str) -> Result<bool, LexiGraphError> {
        let url = self.render_url(markup);
        if url.len() > MAX_GET_URL_LEN {
            debug!("Render URL is {} bytes; skipping probe", url.len());
            return Ok(false);
        }
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            warn!("Render probe rejected markup: HTTP {}", status.as_u16());
            return Err(LexiGraphError::RenderFailed {
                status: Some(status.as_u16()),
                detail: "render service rejected the markup".into(),
            });
        }
        debug!("Render probe accepted markup");
        Ok(true)
    }

    /// Download the rendered image.
    pub async fn fetch(&self, markup: &str) -> Result<RenderedImage, LexiGraphError> {
        let url = self.render_url(markup);
        let request = if url.len() > MAX_GET_URL_LEN {
            debug!("Render URL is {} bytes; using POST", url.len());
            self.client.post(self.base_url.clone()).json(&RenderRequest {
                graph: markup,
                format: self.format.as_str(),
            })
        } else {
            self.client.get(&url)
        };

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(self.format.content_type())
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&bytes).trim().to_string();
            warn!("Render failed: HTTP {}: {}", status.as_u16(), detail);
            return Err(LexiGraphError::RenderFailed {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let image = RenderedImage {
            bytes: bytes.to_vec(),
            content_type,
            format: self.format,
        };
        if !image.looks_valid() {
            return Err(LexiGraphError::RenderFailed {
                status: Some(status.as_u16()),
                detail: format!("response is not a {} image", self.format),
            });
        }
        info!("Rendered {} image: {} bytes", self.format, image.bytes.len());
        Ok(image)
    }

    fn transport_error(&self, e: reqwest::Error) -> LexiGraphError {
        if e.is_timeout() {
            LexiGraphError::RenderTimeout {
                secs: self.timeout_secs,
            }
        } else {
            LexiGraphError::RenderFailed {
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> RenderService {
        RenderService::new("https://quickchart.io/graphviz", ImageFormat::Png, 10).unwrap()
    }

    #[test]
    fn render_url_encodes_markup() {
        let url = service().render_url("digraph G { a -> b; }");
        assert!(url.starts_with("https://quickchart.io/graphviz?graph="));
        assert!(url.contains("digraph+G+%7B+a+-%3E+b%3B+%7D"), "got: {url}");
        assert!(url.ends_with("&format=png"));
    }

    #[test]
    fn render_url_round_trips_through_parser() {
        let markup = "digraph G { A [label=\"الذكاء & AI\"]; }";
        let url = reqwest::Url::parse(&service().render_url(markup)).unwrap();
        let graph = url
            .query_pairs()
            .find(|(k, _)| k == "graph")
            .map(|(_, v)| v.into_owned());
        assert_eq!(graph.as_deref(), Some(markup));
    }

    #[test]
    fn bad_base_url_is_config_error() {
        let err = RenderService::new("::nope", ImageFormat::Png, 10).unwrap_err();
        assert!(matches!(err, LexiGraphError::InvalidConfig(_)));
    }

    #[test]
    fn data_uri_and_sniffing() {
        let png = RenderedImage {
            bytes: b"\x89PNG\r\n\x1a\nrest".to_vec(),
            content_type: "image/png".into(),
            format: ImageFormat::Png,
        };
        assert!(png.looks_valid());
        assert!(png.to_data_uri().starts_with("data:image/png;base64,iVBORw0K"));

        let svg = RenderedImage {
            bytes: b"<?xml version=\"1.0\"?><svg xmlns=\"...\"></svg>".to_vec(),
            content_type: "image/svg+xml".into(),
            format: ImageFormat::Svg,
        };
        assert!(svg.looks_valid());

        let html = RenderedImage {
            bytes: b"<html>error</html>".to_vec(),
            content_type: "text/html".into(),
            format: ImageFormat::Png,
        };
        assert!(!html.looks_valid());
    }

    #[tokio::test]
    async fn long_markup_skips_probe() {
        let markup = format!("digraph G {{ {} }}", "a -> b; ".repeat(2000));
        assert!(!service().probe(&markup).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_service_is_render_failure() {
        let svc = RenderService::new("http://127.0.0.1:9/graphviz", ImageFormat::Png, 2).unwrap();
        let err = svc.fetch("digraph G { a; }").await.unwrap_err();
        assert!(
            matches!(
                err,
                LexiGraphError::RenderFailed { status: None, .. } | LexiGraphError::RenderTimeout { .. }
            ),
            "got: {err:?}"
        );
    }
}
