//! Image acquisition: probe first, then fetch
//!
//! The probe is a HEAD request that checks status, content type and declared length before
//! any body is downloaded. The fetch re-checks the length while streaming, so a host that
//! omits or understates `content-length` still cannot push more than the maximum.

use crate::config::FetchConfig;
use crate::error::FrameError;
use crate::fetch::map_http_error;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// What a successful probe learned about an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    /// Whitelisted mime type, without parameters
    pub mime_type: String,
    /// Declared size, when the host sent one
    pub size: Option<u64>,
}

/// Source of remote images
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Check type and size without downloading the body
    async fn probe(&self, url: &str) -> Result<ImageProbe, FrameError>;

    /// Download the full image; only called after a successful probe
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FrameError>;
}

/// HTTP implementation of [`ImageSource`]
pub struct HttpImageAcquirer {
    client: Client,
    allowed_mime_types: Vec<String>,
    max_bytes: u64,
}

impl HttpImageAcquirer {
    pub fn new(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            max_bytes: config.max_image_bytes,
        }
    }

    fn allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime_type)
    }
}

/// Content type without parameters, lowercased
fn mime_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[async_trait]
impl ImageSource for HttpImageAcquirer {
    async fn probe(&self, url: &str) -> Result<ImageProbe, FrameError> {
        let response = self.client.head(url).send().await.map_err(map_http_error)?;

        if response.status() != StatusCode::OK {
            return Err(FrameError::ImageUnavailable(format!(
                "Probe returned status {}",
                response.status()
            )));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(mime_essence)
            .ok_or_else(|| FrameError::ImageUnavailable("Probe had no content-type".to_string()))?;
        if !self.allowed(&mime_type) {
            return Err(FrameError::ImageUnavailable(format!(
                "Content type {} is not allowed",
                mime_type
            )));
        }

        // Read the header directly: the body of a HEAD response is always empty.
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(size) = size {
            if size > self.max_bytes {
                return Err(FrameError::ImageUnavailable(format!(
                    "Image is {} bytes, limit is {}",
                    size, self.max_bytes
                )));
            }
        }

        debug!(url = %url, mime_type = %mime_type, size = ?size, "Image probe accepted");
        Ok(ImageProbe { mime_type, size })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FrameError> {
        let response = self.client.get(url).send().await.map_err(map_http_error)?;
        if response.status() != StatusCode::OK {
            return Err(FrameError::ImageUnavailable(format!(
                "Fetch returned status {}",
                response.status()
            )));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_http_error)?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FrameError::ImageUnavailable(format!(
                    "Image exceeded {} bytes while downloading",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = bytes.len(), "Image fetched");
        Ok(bytes)
    }
}
