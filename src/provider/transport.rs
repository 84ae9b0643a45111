//! Retry transport for outbound backend calls
//!
//! Wraps a single HTTP call with bounded exponential backoff. Rate limits
//! (429), server errors (5xx), and the vendor "overloaded" code (529) are
//! retried; other statuses return immediately. After retries are exhausted
//! the last failing response is returned as `Ok`, so callers can tell
//! "exhausted retries" apart from a transport-level failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::core::config::RetryConfig;
use crate::core::error::Result;

/// Vendor-specific "overloaded" status treated like a rate limit
const OVERLOADED: u16 = 529;

/// Transport-neutral view of one HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Server-supplied retry hint, in seconds
    pub retry_after: Option<f64>,
    /// Response body text
    pub body: String,
}

impl HttpResponse {
    /// Build from a reqwest response, consuming the body
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body = response.text().await?;
        Ok(Self {
            status,
            retry_after,
            body,
        })
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Should this status be retried at all
fn is_retryable(status: u16) -> bool {
    status == 429 || status == OVERLOADED || (500..600).contains(&status)
}

/// Bounded-retry wrapper for one logical backend call
#[derive(Debug, Clone)]
pub struct RetryTransport {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryTransport {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.base_delay_secs),
            max_delay: Duration::from_secs_f64(config.max_delay_secs),
        }
    }

    /// Perform `op` up to `max_retries + 1` times.
    ///
    /// `op` must issue one fresh attempt per invocation. Transport-level
    /// errors (connect failures, body read errors) propagate immediately as
    /// `Err`; HTTP-level failures drive the retry policy.
    pub async fn send<F, Fut>(&self, mut op: F) -> Result<HttpResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let response = op().await?;

            if response.is_success() || !is_retryable(response.status) {
                return Ok(response);
            }

            if attempt >= self.max_retries {
                warn!(
                    status = response.status,
                    attempts = attempt + 1,
                    "retries exhausted, returning last response"
                );
                return Ok(response);
            }

            let delay = self.delay_for(attempt, response.retry_after);
            debug!(
                status = response.status,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying backend call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Delay before the next attempt: the server hint if present, otherwise
    /// `base * 2^attempt * jitter` with jitter uniform in [0.5, 1.0); both
    /// forms are capped at `max_delay`.
    fn delay_for(&self, attempt: u32, retry_after: Option<f64>) -> Duration {
        if let Some(seconds) = retry_after {
            return Duration::from_secs_f64(seconds.max(0.0)).min(self.max_delay);
        }
        let jitter: f64 = rand::rng().random_range(0.5..1.0);
        let backoff = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32) * jitter;
        Duration::from_secs_f64(backoff).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transport(max_retries: u32) -> RetryTransport {
        RetryTransport::new(&RetryConfig {
            max_retries,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
        })
    }

    fn scripted(
        statuses: &'static [u16],
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<HttpResponse>>>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let status = statuses[n.min(statuses.len() - 1)];
            Box::pin(async move {
                Ok(HttpResponse {
                    status,
                    retry_after: None,
                    body: format!("body-{status}"),
                })
            }) as std::pin::Pin<Box<dyn Future<Output = Result<HttpResponse>>>>
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn two_rate_limits_then_success() {
        let (calls, op) = scripted(&[429, 429, 200]);
        let start = Instant::now();

        let response = transport(5).send(op).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two sleeps: 1 * 2^0 * j + 1 * 2^1 * j, jitter in [0.5, 1.0)
        let elapsed = start.elapsed().as_secs_f64();
        assert!(elapsed >= 1.5, "elapsed {elapsed}");
        assert!(elapsed < 3.0, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_response_unmodified() {
        let (calls, op) = scripted(&[429]);

        let response = transport(2).send(op).await.unwrap();

        // max_retries = 2 means exactly 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(response.status, 429);
        assert_eq!(response.body, "body-429");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_backoff() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();

        let response = transport(5)
            .send(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        Ok(HttpResponse {
                            status: 429,
                            retry_after: Some(5.0),
                            body: String::new(),
                        })
                    } else {
                        Ok(HttpResponse {
                            status: 200,
                            retry_after: None,
                            body: "ok".into(),
                        })
                    }
                })
                    as std::pin::Pin<Box<dyn Future<Output = Result<HttpResponse>>>>
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let elapsed = start.elapsed().as_secs_f64();
        assert!(elapsed >= 5.0, "elapsed {elapsed}");
        assert!(elapsed < 5.5, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn overloaded_is_retried_and_client_errors_are_not() {
        let (calls, op) = scripted(&[529, 200]);
        let response = transport(5).send(op).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let (calls, op) = scripted(&[404]);
        let response = transport(5).send(op).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_is_capped() {
        let t = transport(5);
        let d = t.delay_for(30, None);
        assert!(d <= Duration::from_secs(60));
        let d = t.delay_for(0, Some(600.0));
        assert_eq!(d, Duration::from_secs(60));
    }
}
