//! HTTP fetcher for feeds and outlet homepages
//!
//! This module provides the shared HTTP client used by seed discovery and the
//! reachability probe, with features including:
//! - User-Agent rotation
//! - Rate limiting with governor
//! - Automatic retry with exponential backoff for 429/5xx answers
//! - Redirect resolution via HEAD requests

use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Method, Response,
};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const ACCEPT_ANY: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml;q=0.9,*/*;q=0.8";

/// Shared page fetcher
///
/// Each call takes its own timeout so feeds, pages and redirect probes can
/// use different limits on one connection pool.
pub struct PageFetcher {
    /// HTTP client with compression and cookie store
    client: Client,

    /// Rate limiter shared by every request of the process
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Backoff policy for retryable status codes
    retry: RetryConfig,
}

impl PageFetcher {
    /// Create a new fetcher with default settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(requests_per_second: u32) -> Result<Self, FetchError> {
        Self::with_config(requests_per_second, RetryConfig::with_delays(1, 500, 5_000))
    }

    /// Create a new fetcher with a custom retry policy
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(requests_per_second: u32, retry: RetryConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry,
        })
    }

    /// Fetch a body as raw bytes (feeds are parsed from bytes)
    ///
    /// # Errors
    ///
    /// `FetchError::ServerError` for non-success answers once retries are spent,
    /// `FetchError::Timeout` or `FetchError::Http` for transport failures.
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self.get_with_retry(url, timeout).await?;
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }

    /// Fetch a body as text, honoring the declared charset
    ///
    /// # Errors
    ///
    /// Same as [`PageFetcher::fetch_bytes`].
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self.get_with_retry(url, timeout).await?;
        response.text().await.map_err(classify)
    }

    /// Final URL after following the redirect chain of `url`
    ///
    /// Falls back to the input URL when the HEAD request fails.
    pub async fn resolve_redirects(&self, url: &str, timeout: Duration) -> String {
        match self.head(url, timeout).await {
            Ok(response) => {
                let resolved = response.url().to_string();
                if resolved != url {
                    debug!(from = url, to = %resolved, "Resolved redirect chain");
                }
                resolved
            }
            Err(e) => {
                warn!(url, error = %e, "Error resolving URL, using it as-is");
                url.to_string()
            }
        }
    }

    /// Status code of a HEAD request after redirects, `None` on transport failure
    pub async fn probe_status(&self, url: &str, timeout: Duration) -> Option<u16> {
        match self.head(url, timeout).await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                debug!(url, error = %e, "Probe failed");
                None
            }
        }
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<Response, FetchError> {
        self.rate_limiter.until_ready().await;
        self.client
            .request(Method::HEAD, url)
            .headers(self.build_headers())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)
    }

    /// GET with rate limiting and exponential backoff retry
    async fn get_with_retry(&self, url: &str, timeout: Duration) -> Result<Response, FetchError> {
        with_retry_if(
            &self.retry,
            move || async move {
                self.rate_limiter.until_ready().await;
                let response = self
                    .client
                    .get(url)
                    .headers(self.build_headers())
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(classify)?;

                let status = response.status();
                if status.is_success() {
                    Ok(response)
                } else {
                    Err(FetchError::ServerError(status.as_u16()))
                }
            },
            Self::is_retryable,
        )
        .await
    }

    /// Determine if an error should trigger a retry
    ///
    /// Retry on 429 and 500/502/503/504 answers and on timeouts. Other client
    /// errors (400, 401, 403, 404, ...) are returned immediately.
    fn is_retryable(error: &FetchError) -> bool {
        match error {
            FetchError::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            FetchError::Timeout => true,
            _ => false,
        }
    }

    /// Build browser-like request headers
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, HeaderValue::from_static(self.random_user_agent()));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_ANY));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(e)
    }
}
