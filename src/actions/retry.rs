//! # Action retry
//!
//! [`RetryingAction`] wraps any [`Action`] and retries transient failures
//! (rate limits, timeouts, 5xx responses and dropped connections) with the
//! backoff described by a [`RetryConfig`]. Google `RetryInfo.retryDelay` hints
//! are honoured before the next attempt.

use crate::actions::{Action, ActionContext, ActionError, ActionOutput};
use crate::model::ActionKind;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval, jitter};
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for action retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    pub strategy: RetryStrategy,
    /// Only retry rate limit (429) errors instead of every transient error
    pub only_retry_rate_limits: bool,
}

#[derive(Debug, Clone)]
pub enum RetryStrategy {
    Fixed,
    ExponentialBackoff,
    /// Exponential backoff with jitter to avoid thundering herd
    ExponentialBackoffWithJitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            strategy: RetryStrategy::ExponentialBackoffWithJitter,
            only_retry_rate_limits: false,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: usize, base_delay: Duration, strategy: RetryStrategy) -> Self {
        Self {
            max_attempts,
            base_delay,
            strategy,
            only_retry_rate_limits: false,
        }
    }

    pub fn rate_limits_only(mut self) -> Self {
        self.only_retry_rate_limits = true;
        self
    }

    /// More attempts with shorter delays.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            strategy: RetryStrategy::ExponentialBackoffWithJitter,
            only_retry_rate_limits: false,
        }
    }

    /// Fewer attempts with longer delays.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(2000),
            strategy: RetryStrategy::ExponentialBackoff,
            only_retry_rate_limits: false,
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            strategy: RetryStrategy::Fixed,
            only_retry_rate_limits: false,
        }
    }

    /// The delays between attempts, one per retry.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let take = self.max_attempts;
        match self.strategy {
            RetryStrategy::Fixed => Box::new(FixedInterval::new(self.base_delay).take(take)),
            // from_millis(2) doubles each step; the factor scales the first delay to base_delay.
            RetryStrategy::ExponentialBackoff => Box::new(
                ExponentialBackoff::from_millis(2)
                    .factor((base_ms / 2).max(1))
                    .max_delay(MAX_BACKOFF)
                    .take(take),
            ),
            RetryStrategy::ExponentialBackoffWithJitter => Box::new(
                ExponentialBackoff::from_millis(2)
                    .factor((base_ms / 2).max(1))
                    .max_delay(MAX_BACKOFF)
                    .map(jitter)
                    .take(take),
            ),
        }
    }

    fn should_retry(&self, error: &ActionError) -> bool {
        if self.only_retry_rate_limits {
            error.is_rate_limit()
        } else {
            error.is_transient()
        }
    }
}

/// An [`Action`] decorator that retries transient failures.
pub struct RetryingAction {
    inner: Arc<dyn Action>,
    config: RetryConfig,
}

impl RetryingAction {
    pub fn new(inner: Arc<dyn Action>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Action for RetryingAction {
    fn kind(&self) -> ActionKind {
        self.inner.kind()
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let counter = AtomicUsize::new(0);
        let kind = self.inner.kind();
        let (attempts, kind_ref, inner, retry) = (&counter, &kind, &self.inner, &self.config);

        let result = RetryIf::spawn(
            retry.delays(),
            || async move {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(zap_id = %ctx.zap_id, action = %kind_ref, attempt, "Executing action");
                let outcome = inner.execute(ctx, config).await;
                if let Err(e) = &outcome {
                    if let Some(hint) = e.retry_hint().filter(|_| retry.should_retry(e)) {
                        debug!(zap_id = %ctx.zap_id, delay_ms = hint.as_millis() as u64, "Honouring server retry delay");
                        tokio::time::sleep(hint.min(MAX_BACKOFF)).await;
                    }
                }
                outcome
            },
            |e: &ActionError| retry.should_retry(e),
        )
        .await;

        let attempts = counter.load(Ordering::Relaxed);
        if let Err(e) = &result {
            if attempts > 1 {
                warn!(zap_id = %ctx.zap_id, action = %kind, attempts, error = %e, "Action failed after retries");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Flaky {
        failures: AtomicUsize,
        error: fn() -> ActionError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Action for Flaky {
        fn kind(&self) -> ActionKind {
            ActionKind::Webhook
        }

        async fn execute(&self, _ctx: &ActionContext, _config: &Value) -> Result<ActionOutput, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(ActionOutput {
                message: "ok".to_string(),
                details: json!({}),
            })
        }
    }

    fn ctx() -> ActionContext {
        ActionContext {
            zap_id: "zap-1".to_string(),
            zap_name: "n".to_string(),
            trigger_data: json!({}),
            google: None,
        }
    }

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1), RetryStrategy::Fixed)
    }

    fn unavailable() -> ActionError {
        ActionError::HttpStatus {
            status: 503,
            body: String::new(),
        }
    }

    fn not_found() -> ActionError {
        ActionError::HttpStatus {
            status: 404,
            body: String::new(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 2);
        assert!(matches!(
            config.strategy,
            RetryStrategy::ExponentialBackoffWithJitter
        ));
        assert!(!config.only_retry_rate_limits);
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryConfig::aggressive().max_attempts, 5);
        assert_eq!(RetryConfig::conservative().base_delay, Duration::from_millis(2000));
        assert_eq!(RetryConfig::disabled().delays().count(), 0);
        assert!(RetryConfig::default().rate_limits_only().only_retry_rate_limits);
    }

    #[test]
    fn exponential_delays_double_from_base() {
        let config = RetryConfig::new(4, Duration::from_millis(100), RetryStrategy::ExponentialBackoff);
        let delays: Vec<_> = config.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = Arc::new(Flaky {
            failures: AtomicUsize::new(2),
            error: unavailable,
            calls: AtomicUsize::new(0),
        });
        let action = RetryingAction::new(flaky.clone(), fast(3));

        let result = action.execute(&ctx(), &json!({})).await;

        assert!(result.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let flaky = Arc::new(Flaky {
            failures: AtomicUsize::new(1),
            error: not_found,
            calls: AtomicUsize::new(0),
        });
        let action = RetryingAction::new(flaky.clone(), fast(3));

        let result = action.execute(&ctx(), &json!({})).await;

        assert!(result.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let flaky = Arc::new(Flaky {
            failures: AtomicUsize::new(10),
            error: unavailable,
            calls: AtomicUsize::new(0),
        });
        let action = RetryingAction::new(flaky.clone(), fast(2));

        let result = action.execute(&ctx(), &json!({})).await;

        assert!(result.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(action.kind(), ActionKind::Webhook);
    }

    #[tokio::test]
    async fn rate_limit_only_mode_skips_server_errors() {
        let flaky = Arc::new(Flaky {
            failures: AtomicUsize::new(1),
            error: unavailable,
            calls: AtomicUsize::new(0),
        });
        let action = RetryingAction::new(flaky.clone(), fast(3).rate_limits_only());

        let result = action.execute(&ctx(), &json!({})).await;

        assert!(result.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
