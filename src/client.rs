//! HTTP client for the NovelAI image-generation endpoint.
//!
//! One outbound POST per tool invocation; no retry, no backoff. A failed
//! call is reported to the caller, who may reissue the tool call (which
//! draws a fresh seed).

use crate::config::Config;
use crate::error::{ConfigError, Error};
use crate::upstream::GenerationPayload;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Base URL of the NovelAI image service.
pub const BASE_URL: &str = "https://image.novelai.net";

/// Request timeout for generation calls. Image generation regularly takes
/// tens of seconds; the cap exists so a wedged upstream cannot hold a
/// session slot forever.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the NovelAI image-generation API.
pub struct NovelAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NovelAiClient {
    /// Create a new client from configuration, honoring the configured
    /// forward proxy when present.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if the proxy URL cannot be parsed.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ConfigError::invalid_value("HTTPS_PROXY", e.to_string()))?;
            builder = builder.proxy(proxy);
            info!(proxy = %proxy_url, "Using proxy");
        }

        let http = builder
            .build()
            .map_err(|e| ConfigError::invalid_value("HTTP client", e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Create a client against a custom base URL (for tests).
    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    /// Issue a single generation request, returning the raw response bytes.
    ///
    /// The response may be a bare PNG or a ZIP archive containing one; see
    /// [`crate::decode`]. Non-success statuses fail with [`Error::Upstream`]
    /// carrying the status and body text verbatim; network-level failures
    /// fail with [`Error::UpstreamUnreachable`].
    #[instrument(level = "info", name = "generate_image", skip_all)]
    pub async fn generate_image(&self, payload: &GenerationPayload) -> Result<Vec<u8>, Error> {
        let endpoint = format!("{}/ai/generate-image", self.base_url);
        debug!(endpoint = %endpoint, "Requesting NovelAI");

        let response = self
            .http
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Origin", "https://novelai.net")
            .header("Referer", "https://novelai.net/")
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnreachable(e.to_string()))?;

        info!(bytes = bytes.len(), "Received image data");
        Ok(bytes.to_vec())
    }
}
