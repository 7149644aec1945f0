//! Single-request execution with retries.
//!
//! ```text
//! attempt 1 ──2xx──────────────> Success
//!     │──404────────────────────> Skipped            (no retry, no backoff)
//!     │──other failure──sleep(delay(1))──> attempt 2 ──...──> attempt N
//!                                                              │──failure──> Failed
//! ```
//!
//! Every attempt is bounded by the attempt timeout and emits one tracing event carrying the
//! request id, the attempt number and the outcome class.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::config::FetchConfig;
use crate::http::HttpClient;
use crate::metrics;
use crate::request::{
    AttemptOutcome, FailureKind, FetchError, FetchOutcome, FetchResult, RequestDescriptor,
};

/// Executes one descriptor against the shared client, retrying with backoff.
///
/// Cloning is cheap and clones share the client.
pub struct RequestExecutor<H: HttpClient> {
    http_client: Arc<H>,
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: BackoffPolicy,
}

impl<H: HttpClient> Clone for RequestExecutor<H> {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            max_attempts: self.max_attempts,
            attempt_timeout: self.attempt_timeout,
            backoff: self.backoff,
        }
    }
}

impl<H: HttpClient> RequestExecutor<H> {
    /// Create an executor. `max_attempts` below 1 is treated as 1.
    pub fn new(
        http_client: Arc<H>,
        max_attempts: u32,
        attempt_timeout: Duration,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            http_client,
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff,
        }
    }

    pub fn from_config(http_client: Arc<H>, config: &FetchConfig) -> Self {
        Self::new(
            http_client,
            config.max_attempts,
            config.attempt_timeout(),
            config.backoff_policy(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Execute a descriptor until it succeeds, is skipped, or runs out of attempts.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> FetchResult {
        self.execute_with_cancellation(descriptor, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but gives up with [`FetchError::Cancelled`] as soon as
    /// `cancellation` fires, whether an attempt is in flight or a backoff wait is running.
    #[tracing::instrument(
        skip(self, descriptor, cancellation),
        fields(request_id = %descriptor.id, method = %descriptor.method)
    )]
    pub async fn execute_with_cancellation(
        &self,
        descriptor: &RequestDescriptor,
        cancellation: &CancellationToken,
    ) -> FetchResult {
        let started = Instant::now();
        let result = self.run_attempts(descriptor, cancellation).await;
        metrics::record_result(&result, started.elapsed());

        match &result.outcome {
            FetchOutcome::Success { .. } => {
                tracing::debug!(attempts = result.attempts, "Request succeeded");
            }
            FetchOutcome::Skipped { reason } => {
                tracing::info!(reason = %reason, "Request skipped");
            }
            FetchOutcome::Failed(error) => {
                tracing::warn!(
                    attempts = result.attempts,
                    kind = error.kind().as_str(),
                    error = %error,
                    "Request failed permanently"
                );
            }
        }

        result
    }

    async fn run_attempts(
        &self,
        descriptor: &RequestDescriptor,
        cancellation: &CancellationToken,
    ) -> FetchResult {
        let mut attempt = 0;

        loop {
            if cancellation.is_cancelled() {
                return FetchResult::failed(&descriptor.id, attempt, FetchError::Cancelled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                outcome = self.attempt(descriptor) => outcome,
                _ = cancellation.cancelled() => {
                    tracing::debug!(attempt, "Attempt abandoned by cancellation");
                    return FetchResult::failed(&descriptor.id, attempt, FetchError::Cancelled);
                }
            };

            let class = outcome.class();
            metrics::record_attempt(class);
            log_attempt(descriptor, attempt, &outcome);

            let error = match outcome.into_result() {
                Ok(payload) => return FetchResult::success(&descriptor.id, attempt, payload),
                Err(error) => error,
            };

            let kind = error.kind();
            if kind == FailureKind::NotFound {
                return FetchResult::skipped(&descriptor.id, attempt, "not found");
            }
            if attempt >= self.max_attempts || !kind.is_retriable() {
                return FetchResult::failed(&descriptor.id, attempt, error);
            }

            let delay = self.backoff.delay(attempt);
            metrics::record_retry(class);
            tracing::debug!(
                attempt,
                next_attempt = attempt + 1,
                backoff_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancellation.cancelled() => {
                    tracing::debug!(attempt, "Backoff interrupted by cancellation");
                    return FetchResult::failed(&descriptor.id, attempt, FetchError::Cancelled);
                }
            }
        }
    }

    /// One attempt, bounded by the attempt timeout.
    async fn attempt(&self, descriptor: &RequestDescriptor) -> AttemptOutcome {
        let call = self.http_client.execute(descriptor, self.attempt_timeout);

        match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(Ok(response)) => AttemptOutcome::from_response(response),
            Ok(Err(e)) => AttemptOutcome::from_error(&e),
            Err(_) => AttemptOutcome::NetworkFailure {
                cause: format!(
                    "attempt timed out after {}ms",
                    self.attempt_timeout.as_millis()
                ),
            },
        }
    }
}

fn log_attempt(descriptor: &RequestDescriptor, attempt: u32, outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Success(_) => {
            tracing::debug!(
                request_id = %descriptor.id,
                attempt,
                outcome = outcome.class(),
                "Attempt completed"
            );
        }
        AttemptOutcome::HttpFailure { status, .. } => {
            tracing::warn!(
                request_id = %descriptor.id,
                attempt,
                outcome = outcome.class(),
                status = *status,
                "Attempt returned error status"
            );
        }
        AttemptOutcome::NetworkFailure { cause } | AttemptOutcome::UnexpectedFailure { cause } => {
            tracing::warn!(
                request_id = %descriptor.id,
                attempt,
                outcome = outcome.class(),
                cause = %cause,
                "Attempt failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VolleyError;
    use crate::http::{HttpResponse, MockHttpClient};
    use serde_json::json;

    const URL: &str = "https://api.example.com/data";
    const KEY: &str = "GET https://api.example.com/data";

    fn executor(mock: &MockHttpClient, max_attempts: u32) -> RequestExecutor<MockHttpClient> {
        RequestExecutor::new(
            Arc::new(mock.clone()),
            max_attempts,
            Duration::from_secs(10),
            BackoffPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let mock = MockHttpClient::new();
        mock.add_response(KEY, Ok(HttpResponse::new(200, r#"{"results":[1]}"#)));

        let result = executor(&mock, 3)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert_eq!(result, FetchResult::success("r1", 1, json!({ "results": [1] })));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_skipped_without_backoff() {
        let mock = MockHttpClient::new();
        mock.add_response(KEY, Ok(HttpResponse::new(404, "missing")));
        mock.add_response(KEY, Ok(HttpResponse::new(200, "{}")));

        let start = Instant::now();
        let result = executor(&mock, 3)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert!(result.is_skipped());
        assert_eq!(result.attempts, 1);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retries_with_exponential_backoff() {
        let mock = MockHttpClient::new();
        mock.add_responses(KEY, 4, HttpResponse::new(503, "unavailable"));

        let result = executor(&mock, 4)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert_eq!(
            result,
            FetchResult::failed(
                "r1",
                4,
                FetchError::Http {
                    status: 503,
                    body: "unavailable".to_string()
                }
            )
        );

        let calls = mock.calls_for("r1");
        assert_eq!(calls.len(), 4);
        // delay(k) = 2^k seconds before attempt k + 1
        for k in 1..4u32 {
            let gap = calls[k as usize].at - calls[k as usize - 1].at;
            assert_eq!(gap, Duration::from_secs(2u64.pow(k)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let mock = MockHttpClient::new();
        mock.add_response(
            KEY,
            Err(VolleyError::Transport("connection refused".to_string())),
        );
        mock.add_response(KEY, Ok(HttpResponse::new(500, "oops")));
        mock.add_response(KEY, Ok(HttpResponse::new(200, r#"{"ok":true}"#)));

        let start = Instant::now();
        let result = executor(&mock, 3)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert_eq!(result, FetchResult::success("r1", 3, json!({ "ok": true })));
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_attempts_as_network_failure() {
        let mock = MockHttpClient::new();
        mock.add_hangs(KEY, 3);

        let executor = RequestExecutor::new(
            Arc::new(mock.clone()),
            3,
            Duration::from_millis(500),
            BackoffPolicy::default(),
        );

        let start = Instant::now();
        let result = executor.execute(&RequestDescriptor::get("r1", URL)).await;

        assert_eq!(result.attempts, 3);
        assert_eq!(
            result.error().map(FetchError::kind),
            Some(FailureKind::Transient)
        );
        assert_eq!(mock.call_count(), 3);
        assert!(start.elapsed() >= Duration::from_secs(2 + 4));
        assert_eq!(mock.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_is_retried() {
        let mock = MockHttpClient::new();
        mock.add_response(KEY, Ok(HttpResponse::new(200, "not json")));
        mock.add_response(KEY, Ok(HttpResponse::new(200, r#"{"v":1}"#)));

        let result = executor(&mock, 2)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert_eq!(result, FetchResult::success("r1", 2, json!({ "v": 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_on_last_attempt_fails_as_unexpected() {
        let mock = MockHttpClient::new();
        mock.add_response(KEY, Ok(HttpResponse::new(200, "not json")));

        let result = executor(&mock, 1)
            .execute(&RequestDescriptor::get("r1", URL))
            .await;

        assert_eq!(
            result.error().map(FetchError::kind),
            Some(FailureKind::Malformed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_tries_once() {
        let mock = MockHttpClient::new();
        mock.add_response(KEY, Ok(HttpResponse::new(200, "{}")));

        let executor = executor(&mock, 0);
        assert_eq!(executor.max_attempts(), 1);
        assert!(executor.execute(&RequestDescriptor::get("r1", URL)).await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let mock = MockHttpClient::new();
        mock.add_responses(KEY, 3, HttpResponse::new(500, "oops"));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = executor(&mock, 3)
            .execute_with_cancellation(&RequestDescriptor::get("r1", URL), &token)
            .await;

        assert_eq!(result, FetchResult::failed("r1", 1, FetchError::Cancelled));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_dispatches() {
        let mock = MockHttpClient::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = executor(&mock, 3)
            .execute_with_cancellation(&RequestDescriptor::get("r1", URL), &token)
            .await;

        assert_eq!(result, FetchResult::failed("r1", 0, FetchError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }
}
