//! HTTP fetcher for the claude.ai organization usage endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use super::error::FetchError;
use super::types::UsageSnapshot;

/// Default Retry-After when a 429 carries no usable header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Boxed future returned by [`UsageFetcher::fetch_usage`]
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UsageSnapshot, FetchError>> + Send + 'a>>;

/// Capability to fetch one usage snapshot.
///
/// Implementations must not retry internally and must bound every call with
/// a timeout; retries happen only through the poller's schedule.
pub trait UsageFetcher: Send + Sync {
    fn fetch_usage(&self) -> FetchFuture<'_>;
}

/// Fetcher bound to an organization ID and browser session cookie
pub struct ClaudeUsageClient {
    http: reqwest::Client,
    url: String,
}

impl ClaudeUsageClient {
    /// Build a client for `{base_url}/organizations/{org_id}/usage`
    pub fn new(
        base_url: &str,
        organization_id: &str,
        session_cookie: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let cookie = HeaderValue::from_str(&format!("sessionKey={}", session_cookie))
            .context("Session cookie contains characters not allowed in a header")?;
        headers.insert(header::COOKIE, cookie);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: usage_url(base_url, organization_id),
        })
    }

    /// Endpoint this client polls
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<UsageSnapshot, FetchError> {
        debug!(url = %self.url, "Fetching usage");

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(err) = classify_status(status, retry_after.as_deref()) {
            warn!(status, "Usage request failed: {}", err);
            return Err(err);
        }

        let bytes = resp.bytes().await.map_err(classify_body)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Api(format!("invalid response body: {}", e)))?;

        UsageSnapshot::from_json(&body)
            .map_err(|e| FetchError::Api(format!("unexpected usage payload: {}", e)))
    }
}

impl UsageFetcher for ClaudeUsageClient {
    fn fetch_usage(&self) -> FetchFuture<'_> {
        Box::pin(self.fetch())
    }
}

/// Build the usage endpoint URL
pub fn usage_url(base_url: &str, organization_id: &str) -> String {
    format!(
        "{}/organizations/{}/usage",
        base_url.trim_end_matches('/'),
        organization_id
    )
}

/// Map an HTTP status to a fetch error, `None` for 2xx
pub fn classify_status(status: u16, retry_after: Option<&str>) -> Option<FetchError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(FetchError::Auth { status }),
        429 => Some(FetchError::RateLimited {
            retry_after_secs: parse_retry_after(retry_after),
        }),
        other => Some(FetchError::Api(format!("HTTP {}", other))),
    }
}

/// Parse a Retry-After header given in seconds.
///
/// HTTP-date values and garbage fall back to [`DEFAULT_RETRY_AFTER_SECS`].
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Network("request timed out".to_string())
    } else if err.is_connect() {
        FetchError::Network(format!("connection failed: {}", err))
    } else {
        FetchError::Api(format!("request failed: {}", err))
    }
}

/// A stalled or cut-off body is a connectivity problem, not an API error
fn classify_body(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Network("request timed out".to_string())
    } else {
        FetchError::Network(format!("failed to read response body: {}", err))
    }
}
