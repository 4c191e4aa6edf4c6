//! HTTP client for the upstream train feed.
//!
//! The feed is a public, unauthenticated endpoint that answers a GET with a
//! raw `^`/`~` delimited text payload. It is picky about clients, so requests
//! carry browser-like headers.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use super::error::FeedError;

/// Default feed endpoint.
pub const DEFAULT_BASE_URL: &str = "https://erail.in/rail/getTrains.aspx";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Endpoint URL (defaults to the production feed)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl FeedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for the upstream train feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    /// Create a new client. The timeout applies to the whole request.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("DNT", HeaderValue::from_static("1"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    /// Query parameters selecting trains through `station_code`.
    ///
    /// The station is passed as both origin and destination, which makes
    /// the feed list every train calling there.
    fn query(station_code: &str) -> [(&'static str, String); 5] {
        [
            ("Station_From", station_code.to_string()),
            ("Station_To", station_code.to_string()),
            ("DataSource", "0".to_string()),
            ("Language", "0".to_string()),
            ("Cache", "true".to_string()),
        ]
    }

    /// Fetch the raw payload for a station.
    pub async fn fetch_raw(&self, station_code: &str) -> Result<String, FeedError> {
        debug!(station = station_code, url = %self.base_url, "requesting train feed");

        let response = self
            .http
            .get(&self.base_url)
            .query(&Self::query(station_code))
            .send()
            .await?;

        let status = response.status();
        info!(status = status.as_u16(), "train feed responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FeedError::EmptyPayload);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = FeedConfig::new()
            .with_base_url("http://localhost:8080/getTrains.aspx")
            .with_timeout(5);

        assert_eq!(config.base_url, "http://localhost:8080/getTrains.aspx");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn config_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn client_creation() {
        assert!(FeedClient::new(FeedConfig::default()).is_ok());
    }

    #[test]
    fn station_is_both_origin_and_destination() {
        let query = FeedClient::query("VN");
        assert!(query.contains(&("Station_From", "VN".to_string())));
        assert!(query.contains(&("Station_To", "VN".to_string())));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        // Port 9 on localhost is the discard port; nothing listens there.
        let config = FeedConfig::new()
            .with_base_url("http://127.0.0.1:9/getTrains.aspx")
            .with_timeout(2);
        let client = FeedClient::new(config).unwrap();

        let err = client.fetch_raw("VN").await.unwrap_err();
        assert!(matches!(err, FeedError::Transport(_) | FeedError::Timeout));
    }
}
