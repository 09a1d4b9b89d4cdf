//! HTTP send with retry and exponential backoff for provider calls
//!
//! Handles 429 rate limiting, 5xx server errors and network timeouts.
//! Any other non-success status fails immediately.

use crate::infra::error::{Error, Result};
use crate::infra::metrics::MatchMetrics;
use crate::services::cancellation::MatchTicket;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO }
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    /// Backoff before retry `attempt` (0-based); rate limiting waits twice as long
    fn delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let factor = 2u32.saturating_pow(attempt + u32::from(rate_limited));
        self.base_delay.saturating_mul(factor)
    }
}

/// Send a request, retrying transient failures.
///
/// Returns the first successful response. Non-retriable statuses and
/// exhausted retries become [`Error::Provider`]; transport failures become
/// [`Error::Http`] with the URL stripped so credentials never reach logs.
/// `ticket` is checked before and after every backoff sleep; once it is
/// superseded no further request is sent.
pub async fn send_with_retry<F>(
    client: &Client,
    build_request: F,
    policy: &RetryPolicy,
    ticket: &MatchTicket,
    provider: &'static str,
    metrics: Option<&MatchMetrics>,
) -> Result<Response>
where
    F: Fn(&Client) -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let delay = match build_request(client).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                let retriable = rate_limited || status.is_server_error();
                if !retriable || attempt >= policy.max_retries {
                    let body = resp.text().await.unwrap_or_default();
                    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
                    return Err(Error::provider(
                        provider,
                        format!("HTTP {} after {} attempts: {}", status.as_u16(), attempt + 1, body),
                    ));
                }
                policy.delay(attempt, rate_limited)
            }
            Err(e) if (e.is_timeout() || e.is_connect()) && attempt < policy.max_retries => {
                policy.delay(attempt, false)
            }
            Err(e) => return Err(Error::Http(e.without_url())),
        };

        if !ticket.is_current() {
            return Err(superseded(provider, attempt + 1));
        }
        warn!(
            provider = %provider,
            attempt = %(attempt + 1),
            delay_ms = %delay.as_millis(),
            "provider_request_retry"
        );
        if let Some(m) = metrics {
            m.record_retry();
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
        if !ticket.is_current() {
            return Err(superseded(provider, attempt));
        }
    }
}

fn superseded(provider: &'static str, attempts: u32) -> Error {
    Error::provider(provider, format!("run superseded after {} attempts", attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock_service::{FailMode, MockBehavior, MockMatcher};
    use crate::services::cancellation::MatchGeneration;
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, base_delay: Duration::from_millis(1) }
    }

    #[test]
    fn test_delay_backoff() {
        let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(100) };
        assert_eq!(policy.delay(0, false), Duration::from_millis(100));
        assert_eq!(policy.delay(2, false), Duration::from_millis(400));
        assert_eq!(policy.delay(0, true), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let client = Client::new();
        let ticket = MatchTicket::detached();
        let url = format!("{}/health", server.base_url());
        let metrics = MatchMetrics::new();

        let resp =
            send_with_retry(&client, |c| c.get(&url), &fast(2), &ticket, "test", Some(&metrics))
                .await
                .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(metrics.summary().provider_retries, 0);
    }

    #[tokio::test]
    async fn test_server_error_retried_then_fails() {
        let behavior = MockBehavior { fail: FailMode::Always(500), ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let client = Client::new();
        let ticket = MatchTicket::detached();
        let url = format!("{}/health", server.base_url());
        let metrics = MatchMetrics::new();

        let result =
            send_with_retry(&client, |c| c.get(&url), &fast(2), &ticket, "test", Some(&metrics))
                .await;

        assert!(matches!(result, Err(Error::Provider { .. })));
        assert_eq!(server.request_count(), 3);
        assert_eq!(metrics.summary().provider_retries, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let behavior = MockBehavior { fail: FailMode::On(vec![1]), ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let client = Client::new();
        let ticket = MatchTicket::detached();
        let url = format!("{}/health", server.base_url());

        let resp = send_with_retry(&client, |c| c.get(&url), &fast(1), &ticket, "test", None).await;
        assert!(resp.is_ok());
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockMatcher::start(0, MockBehavior::default()).await.unwrap();
        let client = Client::new();
        let ticket = MatchTicket::detached();
        let url = format!("{}/nonexistent", server.base_url());

        let result =
            send_with_retry(&client, |c| c.get(&url), &fast(3), &ticket, "test", None).await;
        match result {
            Err(Error::Provider { message, .. }) => assert!(message.starts_with("HTTP 404")),
            other => panic!("expected provider error, got {:?}", other.map(|r| r.status())),
        }
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let client = Client::builder().timeout(Duration::from_millis(500)).build().unwrap();
        let ticket = MatchTicket::detached();
        let url = "http://127.0.0.1:1/";
        let result =
            send_with_retry(&client, |c| c.get(url), &fast(0), &ticket, "test", None).await;
        assert!(matches!(result, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn test_superseded_ticket_stops_retries() {
        let behavior = MockBehavior { fail: FailMode::Always(503), ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let client = Client::new();
        let url = format!("{}/health", server.base_url());
        let generation = MatchGeneration::new();
        let ticket = generation.issue();
        generation.invalidate();
        let metrics = MatchMetrics::new();

        let result =
            send_with_retry(&client, |c| c.get(&url), &fast(2), &ticket, "test", Some(&metrics))
                .await;

        match result {
            Err(Error::Provider { message, .. }) => assert!(message.contains("superseded")),
            other => panic!("expected provider error, got {:?}", other.map(|r| r.status())),
        }
        assert_eq!(server.request_count(), 1);
        assert_eq!(metrics.summary().provider_retries, 0);
    }

    #[tokio::test]
    async fn test_superseded_during_backoff_sends_nothing_more() {
        let behavior = MockBehavior { fail: FailMode::Always(503), ..Default::default() };
        let server = MockMatcher::start(0, behavior).await.unwrap();
        let client = Client::new();
        let url = format!("{}/health", server.base_url());
        let generation = MatchGeneration::new();
        let ticket = generation.issue();
        let metrics = Arc::new(MatchMetrics::new());
        let policy = RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(300) };

        let canceller = {
            let metrics = metrics.clone();
            let generation = generation.clone();
            tokio::spawn(async move {
                while metrics.summary().provider_retries == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                generation.invalidate();
            })
        };

        let result =
            send_with_retry(&client, |c| c.get(&url), &policy, &ticket, "test", Some(&metrics))
                .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(Error::Provider { .. })));
        assert_eq!(server.request_count(), 1);
        assert_eq!(metrics.summary().provider_retries, 1);
    }
}
