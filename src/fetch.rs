//! HTTP retrieval with exponential backoff retry logic.
//!
//! Handlers talk to publishers through the [`FetchAsync`] trait so the
//! transport can be swapped (tests use an in-memory map):
//! - [`ReqwestFetcher`]: the real HTTP client
//! - [`RetryFetch`]: decorator that retries transient failures
//!
//! # Retry Strategy
//!
//! - Only transport errors, 429 and 5xx responses are retried
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::error::{FetchError, HandlerError};
use rand::{Rng, rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Default user agent sent by [`ReqwestFetcher`].
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Trait for async page retrieval.
pub trait FetchAsync {
    /// Fetch `url` and return the response body as text.
    ///
    /// `headers` are sent in addition to whatever the implementation sets by
    /// default. Non-success statuses are errors.
    async fn get_text(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, FetchError>;
}

/// HTTP fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: StdDuration) -> Result<Self, FetchError> {
        let mut defaults = HeaderMap::new();
        let ua = HeaderValue::from_str(user_agent).map_err(|e| FetchError::InvalidHeader {
            name: USER_AGENT.to_string(),
            reason: e.to_string(),
        })?;
        defaults.insert(USER_AGENT, ua);
        let client = reqwest::Client::builder()
            .default_headers(defaults)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            FetchError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        let val = HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(key, val);
    }
    Ok(map)
}

impl FetchAsync for ReqwestFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get_text(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(url)
            .headers(header_map(headers)?)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift);
        let delay = delay.min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get_text(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.get_text(url, headers).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Whether a parsed JSON value carries no data.
pub fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Fetch `url` and parse the body as non-empty JSON.
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn get_json<F: FetchAsync>(
    fetcher: &F,
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<Value, HandlerError> {
    let body = fetcher.get_text(url, headers).await?;
    let value: Value = serde_json::from_str(body.trim()).map_err(|source| HandlerError::Parse {
        context: url.to_string(),
        source,
    })?;
    if is_empty_json(&value) {
        return Err(HandlerError::Empty {
            url: url.to_string(),
        });
    }
    Ok(value)
}
