//! HTTP client for web crawling with rate limiting and error handling.
//!
//! Every request waits on a shared rate limiter derived from the configured
//! inter-request delay, then runs through a bounded retry schedule. A URL that
//! exhausts its attempts yields a typed error; the caller skips it and the
//! crawl continues.

use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::infrastructure::config::NetworkConfig;

/// Failure modes of a single fetch, and the terminal retries-exhausted case.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("transport failure for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} still failing after {attempts} attempts: {last}")]
    AttemptsExhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Bounded-attempt retry schedule: attempt count plus exponential delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay to wait after the given 1-based attempt has failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay)
    }
}

/// Rate-limited HTTP client shared by the sitemap resolver and the page
/// fetch loop.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        // One permit per configured delay period.
        let period = Duration::from_millis(config.request_delay_ms.max(1));
        let quota = Quota::with_period(period).context("Request delay must be non-zero")?;
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Fetch a URL's body text, retrying per the policy.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.retry.max_attempts {
            self.rate_limiter.until_ready().await;

            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("Fetched {url} on attempt {attempt} ({} bytes)", body.len());
                    return Ok(body);
                }
                Err(e) => {
                    warn!("Attempt {attempt}/{} failed for {url}: {e}", self.retry.max_attempts);
                    last_error = Some(e);
                    if attempt < self.retry.max_attempts {
                        sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(FetchError::AttemptsExhausted {
            url: url.to_string(),
            attempts: self.retry.max_attempts,
            last: Box::new(last_error.expect("at least one attempt ran")),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(server_delay_ms: u64) -> NetworkConfig {
        NetworkConfig {
            request_delay_ms: server_delay_ms,
            request_timeout_seconds: 5,
            max_retries: 3,
            retry_base_delay_ms: 1,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(4), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn fetch_text_returns_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let client = HttpClient::new(&fast_config(1)).unwrap();
        let body = client
            .fetch_text(&format!("{}/page", server.url()))
            .await
            .unwrap();
        assert_eq!(body, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_text_gives_up_after_retry_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = HttpClient::new(&fast_config(1)).unwrap();
        let err = client
            .fetch_text(&format!("{}/flaky", server.url()))
            .await
            .unwrap_err();

        match err {
            FetchError::AttemptsExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Status { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(3)
            .create_async()
            .await;

        let client = HttpClient::new(&fast_config(1)).unwrap();
        let err = client
            .fetch_text(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
