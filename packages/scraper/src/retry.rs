//! HTTP retry helpers for transient errors.
//!
//! Every fetcher should use [`send_text`] or [`send_bytes`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so every request gets
//! retried with exponential backoff on transient failures (timeouts,
//! connection resets, server errors, rate limiting).
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! let body = retry::send_text(&policy, || client.get(&url)).await?;
//! let zip = retry::send_bytes(&policy, || client.get(&url)).await?;
//! ```

use std::time::Duration;

use crate::ScrapeError;

/// How many times, and how patiently, to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Returns `true` for status codes worth retrying: 429 and 5xx.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`. A body that fails to download mid-stream is retried like a
/// connection error.
///
/// # Errors
///
/// Returns [`ScrapeError`] if the request fails after all retries or the
/// server returns a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let bytes = send_bytes(policy, build_request).await?;
    String::from_utf8(bytes).map_err(|e| ScrapeError::Parse(format!("body is not UTF-8: {e}")))
}

/// Sends an HTTP request and returns the raw response body.
///
/// # Errors
///
/// Returns [`ScrapeError`] if the request fails after all retries or the
/// server returns a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(policy: &RetryPolicy, build_request: F) -> Result<Vec<u8>, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = send_inner(policy, &build_request, &mut attempt).await?;
        let url = response.url().to_string();

        match response.bytes().await {
            Ok(bytes) => {
                log::debug!("Received {} bytes from {url}", bytes.len());
                return Ok(bytes.to_vec());
            }
            Err(e) if attempt < policy.max_retries && is_transient(&e) => {
                log::warn!("  body read failed for {url}: {e}");
            }
            Err(e) => return Err(ScrapeError::Http(e)),
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
        tokio::time::sleep(delay).await;
    }
}

/// Core retry loop shared by [`send_text`] and [`send_bytes`].
///
/// `attempt` carries the retry count across body-read retries so the
/// policy's budget is shared. Returns the first 2xx response. Redirects
/// are followed by the client, so a 3xx seen here (such as 304) carries no
/// payload and fails like any other non-retryable status.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    policy: &RetryPolicy,
    build_request: &F,
    attempt: &mut u32,
) -> Result<reqwest::Response, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    loop {
        let error = match build_request().send().await {
            Err(e) => {
                if !is_transient(&e) || *attempt >= policy.max_retries {
                    return Err(ScrapeError::Http(e));
                }
                log::warn!("  transient error: {e}");
                ScrapeError::Http(e)
            }
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let error = ScrapeError::Status {
                    status: status.as_u16(),
                    url: response.url().to_string(),
                };
                if !is_retryable_status(status) || *attempt >= policy.max_retries {
                    return Err(error);
                }
                log::warn!("  HTTP {status}");
                error
            }
        };

        *attempt += 1;
        let delay = policy.delay_for(*attempt);
        log::warn!(
            "  retry {}/{} in {delay:?} after: {error}",
            *attempt,
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
