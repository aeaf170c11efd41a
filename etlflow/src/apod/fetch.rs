//! The inbound data source.

use crate::core::Payload;
use crate::errors::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

#[cfg(feature = "http")]
use super::ApodConfig;

/// Query parameters of one APOD request.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct FetchParams {
    /// API key.
    pub api_key: String,
    /// Requested day; the API defaults to today.
    pub date: Option<NaiveDate>,
}

impl Debug for FetchParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchParams")
            .field("api_key", &"<redacted>")
            .field("date", &self.date)
            .finish()
    }
}

impl FetchParams {
    /// Creates parameters for today's record.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            date: None,
        }
    }

    /// Requests a specific day.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Returns the query string pairs.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("api_key", self.api_key.clone())];
        if let Some(date) = self.date {
            pairs.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

/// Source of raw APOD payloads.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Fetches one raw record.
    async fn fetch(&self, params: &FetchParams) -> Result<Payload, FetchError>;
}

/// Longest error body kept in a [`FetchError::Status`].
#[cfg(feature = "http")]
const MAX_ERROR_BODY: usize = 512;

/// A [`Fetcher`] calling the APOD HTTP API with reqwest.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    /// Creates a fetcher for `config.endpoint_url()`.
    pub fn new(config: &ApodConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("etlflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.endpoint_url(),
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<Payload, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&params.to_query_pairs())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %self.url, "APOD request failed");
                FetchError::Transport(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(http.status_code = status.as_u16(), "Received APOD response");

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
