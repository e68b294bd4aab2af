//! Retry policy for interrupted model streams.
//!
//! Only transient failures (a stream that was cut off mid-turn) are
//! retried. The whole turn is replayed from the same transcript after an
//! exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.

use std::time::Duration;

use halu_config::AgentConfig;
use halu_core::error::{Error, ProviderError, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::stream_event::{AgentEvent, DisplaySink};

/// Default number of attempts per model turn (the first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// What to do after attempt `n` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

impl RetryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// No waiting between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before the attempt that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn decide(&self, attempt: u32, error: &ProviderError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt),
        }
    }

    /// Run `op(build())` until it succeeds, fails for good, or the attempt
    /// budget runs out.
    ///
    /// Every attempt gets a freshly built input. Transient provider errors
    /// are retried after the back-off, with a `warn!` and an
    /// [`AgentEvent::Retry`] on the sink; anything else returns at once. The
    /// back-off sleep is abandoned with [`Error::Cancelled`] if `cancel`
    /// fires.
    pub async fn attempt<S, R, T>(
        &self,
        sink: &mut S,
        cancel: &CancellationToken,
        mut build: impl FnMut() -> R,
        mut op: impl AsyncFnMut(&mut S, R) -> Result<T>,
    ) -> Result<T>
    where
        S: DisplaySink + ?Sized,
    {
        let mut attempt = 1;
        loop {
            let error = match op(&mut *sink, build()).await {
                Ok(value) => return Ok(value),
                Err(Error::Provider(e)) => e,
                Err(e) => return Err(e),
            };

            let RetryDecision::Retry { delay } = self.decide(attempt, &error) else {
                return Err(error.into());
            };

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Stream failed, retrying"
            );
            attempt += 1;
            sink.emit(AgentEvent::Retry {
                attempt,
                max_attempts: self.max_attempts,
                reason: error.to_string(),
            });

            if !backoff(delay, cancel).await {
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Sleep for `delay`, returning `false` if cancelled first.
pub async fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::NullSink;

    fn interrupted() -> ProviderError {
        ProviderError::StreamInterrupted("connection reset".into())
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(5), Duration::from_secs(8));
        assert_eq!(policy.delay_for(9), Duration::from_secs(8));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn transient_errors_retry_until_budget() {
        let policy = RetryPolicy::default();
        for attempt in 1..10 {
            assert!(matches!(
                policy.decide(attempt, &interrupted()),
                RetryDecision::Retry { .. }
            ));
        }
        assert_eq!(policy.decide(10, &interrupted()), RetryDecision::GiveUp);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let errors = [
            ProviderError::AuthenticationFailed("bad key".into()),
            ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            },
            ProviderError::RateLimited { retry_after_secs: 5 },
            ProviderError::Network("refused".into()),
        ];
        for e in &errors {
            assert_eq!(policy.decide(1, e), RetryDecision::GiveUp, "{e}");
        }
    }

    #[test]
    fn from_config_uses_agent_settings() {
        let config = AgentConfig {
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 250,
            ..AgentConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_retries_transient_then_succeeds() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);
        let mut built = 0;

        let start = tokio::time::Instant::now();
        let value = policy
            .attempt(
                &mut sink,
                &cancel,
                || {
                    built += 1;
                    built
                },
                async |_sink, n: u32| {
                    if n < 4 {
                        Err(interrupted().into())
                    } else {
                        Ok(n * 10)
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(value, 40);
        // 500ms + 1s + 2s of back-off
        assert_eq!(start.elapsed(), Duration::from_millis(3_500));
        let attempts: Vec<u32> = events
            .iter()
            .map(|e| match e {
                AgentEvent::Retry { attempt, .. } => *attempt,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(attempts, vec![2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_surfaces_last_error_when_exhausted() {
        let policy = RetryPolicy::immediate(3);
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let err = policy
            .attempt(&mut NullSink, &cancel, || (), async |_sink, ()| -> Result<()> {
                calls += 1;
                Err(ProviderError::StreamInterrupted(format!("reset #{calls}")).into())
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 3);
        assert!(err.to_string().contains("reset #3"));
    }

    #[tokio::test]
    async fn attempt_does_not_retry_fatal_errors() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let err = policy
            .attempt(&mut NullSink, &cancel, || (), async |_sink, ()| -> Result<()> {
                calls += 1;
                Err(ProviderError::AuthenticationFailed("bad key".into()).into())
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, Error::Provider(ProviderError::AuthenticationFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cancelled_during_backoff() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = policy
            .attempt(&mut NullSink, &cancel, || (), async |_sink, ()| -> Result<()> {
                Err(interrupted().into())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_or_cancels() {
        let cancel = CancellationToken::new();
        assert!(backoff(Duration::from_secs(2), &cancel).await);

        cancel.cancel();
        assert!(!backoff(Duration::from_secs(60), &cancel).await);
    }
}
