//! Retrying transport: per-attempt timeout with exponential backoff.
//!
//! Wraps any provider. Transient failures (network, timeout, rate limit,
//! 5xx) are retried; everything else is returned immediately.

use async_trait::async_trait;
use clinreact_core::error::ProviderError;
use clinreact_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Build from the `[provider]` config section.
    pub fn from_config(config: &clinreact_config::ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            attempt_timeout: Duration::from_secs(config.timeout_secs),
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based).
    fn backoff_for(&self, retry: u32, error: &ProviderError) -> Duration {
        let exp = self.initial_backoff.as_secs_f64() * self.multiplier.powi(retry as i32);
        let mut backoff = Duration::from_secs_f64(exp.min(self.max_backoff.as_secs_f64()));
        if let ProviderError::RateLimited { retry_after_secs } = error {
            backoff = backoff.max(Duration::from_secs(*retry_after_secs).min(self.max_backoff));
        }
        backoff
    }
}

/// A provider that retries a wrapped provider on transient failure.
pub struct RetryingProvider {
    inner: Arc<dyn clinreact_core::Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn clinreact_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl clinreact_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = ProviderError::NotConfigured("No attempts made".into());

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.policy.backoff_for(attempt - 1, &last_error);
                info!(
                    provider = %self.inner.name(),
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying completion request"
                );
                tokio::time::sleep(backoff).await;
            }

            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.inner.complete(request.clone()))
                    .await;

            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    self.policy.attempt_timeout.as_secs()
                )),
            };

            if !error.is_transient() {
                return Err(error);
            }

            warn!(
                provider = %self.inner.name(),
                attempt = attempt + 1,
                error = %error,
                "Completion attempt failed"
            );
            last_error = error;
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinreact_core::Provider;
    use clinreact_core::message::Message;
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct FlakyProvider {
        failures: Mutex<Vec<ProviderError>>,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl clinreact_core::Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(ProviderResponse {
                    content: "success".into(),
                    model: "test-model".into(),
                })
            } else {
                Err(failures.remove(0))
            }
        }
    }

    /// A mock provider that hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl clinreact_core::Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest {
            model: "test".into(),
            messages: vec![Message::user("hello")],
            stream: false,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            attempt_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_succeeds() {
        let inner = Arc::new(FlakyProvider::new(vec![]));
        let provider = RetryingProvider::new(inner.clone(), policy(3));

        let result = provider.complete(test_request()).await.unwrap();
        assert_eq!(result.content, "success");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::Network("conn refused".into()),
            ProviderError::ApiError {
                status_code: 503,
                message: "loading".into(),
            },
        ]));
        let provider = RetryingProvider::new(inner.clone(), policy(3));

        let result = provider.complete(test_request()).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::Network("a".into()),
            ProviderError::Network("b".into()),
            ProviderError::Network("c".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), policy(2));

        match provider.complete(test_request()).await {
            Err(ProviderError::Network(msg)) => assert_eq!(msg, "b"),
            other => panic!("Expected Network, got: {other:?}"),
        }
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::AuthenticationFailed("bad key".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), policy(3));

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_times_out() {
        let provider = RetryingProvider::new(Arc::new(HangingProvider), policy(2));
        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy(5);
        let e = ProviderError::Network("x".into());
        assert_eq!(p.backoff_for(0, &e), Duration::from_millis(10));
        assert_eq!(p.backoff_for(1, &e), Duration::from_millis(20));
        assert_eq!(p.backoff_for(10, &e), Duration::from_millis(100));
    }

    #[test]
    fn policy_from_config() {
        let config = clinreact_config::ProviderConfig::default();
        let p = RetryPolicy::from_config(&config);
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.initial_backoff, Duration::from_millis(500));
        assert_eq!(p.attempt_timeout, Duration::from_secs(120));
    }
}
