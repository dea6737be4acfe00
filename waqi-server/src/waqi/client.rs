//! WAQI HTTP client.
//!
//! Provides async lookups against the World Air Quality Index feed API and
//! converts responses to domain types.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use tokio::sync::Semaphore;
use tracing::{Span, debug, warn};

use crate::domain::{StationId, Status};

use super::convert::decode_feed;
use super::error::WaqiError;
use super::source::StatusSource;

/// Default base URL for the WAQI API.
pub const DEFAULT_BASE_URL: &str = "https://api.waqi.info";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Configuration for the WAQI client.
#[derive(Debug, Clone)]
pub struct WaqiConfig {
    /// API token, sent as the `token` query parameter
    pub token: String,
    /// Base URL for the API (defaults to production WAQI)
    pub base_url: String,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl WaqiConfig {
    /// Create a new config with the given API token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: 30,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set maximum concurrent requests.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// WAQI feed API client.
///
/// Each lookup is a single GET. A semaphore caps the number of requests in
/// flight; there is no retry or back-off.
#[derive(Debug, Clone)]
pub struct WaqiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    semaphore: Arc<Semaphore>,
    span: Span,
}

impl WaqiClient {
    /// Create a new client. Log events are recorded under `span`.
    pub fn new(config: WaqiConfig, span: Span) -> Result<Self, WaqiError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            WaqiError::InvalidConfig(format!("base URL {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WaqiError::InvalidConfig(format!(
                "base URL {:?} cannot be a base",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            span,
        })
    }

    /// URL of the feed endpoint for `target` (e.g. `@1451`, `beijing`).
    ///
    /// The target is percent-encoded as a single path segment and the path
    /// keeps WAQI's trailing slash.
    fn feed_url(&self, target: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["feed", target, ""]);
        }
        url
    }

    /// Fetch and decode one feed.
    async fn get_feed(&self, target: &str) -> Result<Status, WaqiError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| WaqiError::transport("client is closed"))?;

        let url = self.feed_url(target);
        debug!(parent: &self.span, path = url.path(), "GET feed");

        let response = self
            .http
            .get(url.clone())
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .inspect_err(|e| warn!(parent: &self.span, path = url.path(), error = %e, "request failed"))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(parent: &self.span, path = url.path(), %status, "non-successful response");
            return Err(WaqiError::upstream(format!(
                "server returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.text().await?;

        decode_feed(&body, Utc::now()).inspect_err(|e| {
            warn!(parent: &self.span, path = url.path(), error = %e, "feed rejected");
        })
    }
}

impl StatusSource for WaqiClient {
    async fn by_station(&self, id: StationId) -> Result<Status, WaqiError> {
        self.get_feed(&format!("@{}", id.get())).await
    }

    async fn by_city(&self, city: &str) -> Result<Status, WaqiError> {
        self.get_feed(city).await
    }

    async fn by_geo(&self, lat: f32, lon: f32) -> Result<Status, WaqiError> {
        self.get_feed(&format!("geo:{lat:.6};{lon:.6}")).await
    }

    fn close(&self) -> Result<(), WaqiError> {
        // Wakes anything waiting for a permit; requests already running
        // finish normally.
        self.semaphore.close();
        Ok(())
    }
}
