//! Production implementation of MilitaryFeed over the ADSB.lol v2 REST API.

use crate::error::EnvError;
use crate::feed::MilitaryFeed;
use crate::types::{HexLookup, HexResponse, ListResponse, MilitaryListing};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("skymerge/", env!("CARGO_PKG_VERSION"));

/// HTTP-backed military feed.
///
/// Every request carries the configured timeout so that a slow endpoint can
/// never hold up a fusion cycle for longer than that bound.
pub struct HttpMilitaryFeed {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMilitaryFeed {
    /// Public ADSB.lol API root.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.adsb.lol";

    /// Creates a feed against `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EnvError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EnvError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Creates a feed against the public API.
    pub fn with_default_url(timeout: Duration) -> Result<Self, EnvError> {
        Self::new(Self::DEFAULT_BASE_URL, timeout)
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_err(&self, err: reqwest::Error) -> EnvError {
        if err.is_timeout() {
            EnvError::Timeout(self.timeout.as_millis() as u64)
        } else {
            EnvError::from(err)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, EnvError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        debug!(url, status = response.status().as_u16(), "military feed response");

        let response = response.error_for_status().map_err(|e| self.map_err(e))?;
        response.json::<T>().await.map_err(|e| self.map_err(e))
    }
}

#[async_trait]
impl MilitaryFeed for HttpMilitaryFeed {
    async fn lookup_hex(&self, hex: &str) -> Result<HexLookup, EnvError> {
        let key = hex.trim().to_ascii_uppercase();
        let url = format!("{}/v2/hex/{}", self.base_url, key);
        let body: HexResponse = self.get_json(&url).await?;

        Ok(HexLookup {
            military: body.military_flag(),
            hex: key,
        })
    }

    async fn fetch_list(&self) -> Result<MilitaryListing, EnvError> {
        let url = format!("{}/v2/mil", self.base_url);
        let body: ListResponse = self.get_json(&url).await?;
        Ok(body.into_listing())
    }

    fn name(&self) -> &str {
        "adsb.lol"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let feed = HttpMilitaryFeed::new("http://localhost:9/", Duration::from_millis(50)).unwrap();
        assert_eq!(feed.base_url(), "http://localhost:9");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        // Port 9 (discard) is not expected to serve HTTP.
        let feed = HttpMilitaryFeed::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(feed.lookup_hex("ae1234").await.is_err());
        assert!(feed.fetch_list().await.is_err());
    }
}
