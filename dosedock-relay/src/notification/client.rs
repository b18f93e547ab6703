//! Resilient HTTP client for delivery providers.
//!
//! Wraps a `reqwest::Client` with a client-side rate limit and a bounded
//! retry loop with linear backoff. Response statuses are classified so that
//! throttling and server errors are retried while other client errors fail
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::context::DeliveryContext;
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::retry::{RetryPolicy, StatusClass};
use crate::{Error, Result};

/// Configuration for a resilient client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Client-side rate limit.
    pub rate_limit: RateLimiterConfig,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("dosedock-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit: RateLimiterConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Successful provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Number of network calls made, including the successful one.
    pub attempts: u32,
}

/// Rate-limited, retrying client for one remote provider.
///
/// Each instance owns its own rate-limit state; share an instance (behind an
/// `Arc`) to have callers share one limit.
#[derive(Debug)]
pub struct ResilientClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl ResilientClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self::with_http_client(http, config))
    }

    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            limiter: RateLimiter::new(config.rate_limit),
            policy: config.retry,
        }
    }

    /// The underlying HTTP client, for building requests.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send one logical request.
    ///
    /// The rate limit is applied once, before the first attempt; retries
    /// only wait for their backoff. Both waits, and the wait for an issued
    /// attempt, end early with the context's error. An abandoned attempt
    /// keeps running detached until it completes or hits the HTTP client
    /// timeout.
    ///
    /// # Errors
    ///
    /// - `Permanent` for a non-2xx status other than 429/5xx (no retry)
    /// - `Transient` once transport failures or 429/5xx exhaust the policy
    /// - `Timeout`/`Cancelled` when the context ends before or during an
    ///   attempt, or during a wait
    pub async fn send(
        &self,
        ctx: &DeliveryContext,
        request: reqwest::Request,
    ) -> Result<ProviderResponse> {
        ctx.check()?;

        let waited = self.limiter.acquire(ctx).await?;
        if !waited.is_zero() {
            debug!(waited = ?waited, url = %request.url(), "Rate limit delayed request");
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.check()?;

            let attempt_request = request
                .try_clone()
                .ok_or_else(|| Error::invalid_request("request body cannot be replayed"))?;

            // Abandoned, not aborted, when the context ends mid-call.
            let pending = self.http.execute(attempt_request);
            let exchange = ctx.run_detached(read_reply(pending)).await;

            let failure = match exchange {
                Ok((status, body)) => match StatusClass::of(status) {
                    StatusClass::Success => {
                        debug!(attempt, status, "Provider accepted request");
                        return Ok(ProviderResponse {
                            status,
                            body,
                            attempts: attempt,
                        });
                    }
                    StatusClass::Retryable => {
                        warn!(attempt, status, body = %body, "Provider returned temporary error");
                        format!("status={} body={}", status, body)
                    }
                    StatusClass::Permanent => {
                        warn!(attempt, status, body = %body, "Provider returned permanent error");
                        return Err(Error::Permanent { status, body });
                    }
                },
                Err(Error::Http(e)) => {
                    warn!(attempt, error = %e, "Provider request failed");
                    format!("request error: {}", e)
                }
                Err(e) => return Err(e),
            };

            if !self.policy.should_retry(attempt) {
                return Err(Error::transient(format!(
                    "giving up after {} attempts: {}",
                    attempt, failure
                )));
            }

            ctx.sleep(self.policy.delay_after(attempt)).await?;
        }
    }
}

/// Wait for a provider reply and read its status and body.
async fn read_reply(
    pending: impl Future<Output = reqwest::Result<reqwest::Response>>,
) -> Result<(u16, String)> {
    let response = pending.await?;
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn fast_client(max_attempts: u32, backoff_step_ms: u64) -> ResilientClient {
        ResilientClient::new(ClientConfig {
            timeout: Duration::from_secs(2),
            rate_limit: RateLimiterConfig {
                max_per_second: 1000.0,
            },
            retry: RetryPolicy {
                max_attempts,
                backoff_step_ms,
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn post(client: &ResilientClient, server: &MockServer) -> reqwest::Request {
        client
            .http()
            .post(format!("{}/messages", server.uri()))
            .form(&[("Body", "hello")])
            .build()
            .unwrap()
    }

    fn ctx() -> DeliveryContext {
        DeliveryContext::with_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/messages"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(3, 10);
        let response = client.send(&ctx(), post(&client, &server)).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.attempts, 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(3, 10);
        let err = client.send(&ctx(), post(&client, &server)).await.unwrap_err();
        match err {
            Error::Permanent { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad number");
            }
            other => panic!("expected permanent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_attempts() {
        // Nothing listens on the closed server's port.
        let server = MockServer::start().await;
        let client = fast_client(2, 10);
        let request = post(&client, &server);
        drop(server);

        let err = client.send(&ctx(), request).await.unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }

    #[tokio::test]
    async fn test_context_already_expired() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = fast_client(3, 10);
        let ctx = DeliveryContext::with_timeout(Duration::ZERO);
        let err = client.send(&ctx, post(&client, &server)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_slow_reply_is_abandoned_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(3, 10);
        let ctx = DeliveryContext::with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = client.send(&ctx, post(&client, &server)).await.unwrap_err();

        assert!(matches!(err, Error::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retries_do_not_wait_for_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // One send per 10s; a retry that re-acquired the limiter would stall.
        let client = ResilientClient::new(ClientConfig {
            timeout: Duration::from_secs(2),
            rate_limit: RateLimiterConfig::with_rps(0.1).unwrap(),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_step_ms: 10,
            },
            ..Default::default()
        })
        .unwrap();

        let ctx = DeliveryContext::with_timeout(Duration::from_secs(20));
        let started = std::time::Instant::now();
        let response = client.send(&ctx, post(&client, &server)).await.unwrap();

        assert_eq!(response.attempts, 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
