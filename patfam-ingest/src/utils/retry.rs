//! Page fetch retry logic
//!
//! Exponential backoff with optional jitter for transient provider failures.
//! Adapters never loop on errors themselves; every page fetch goes through
//! [`retry_transient`] with the run's [`RetryPolicy`].

use crate::error::ProviderError;
use crate::types::ProviderId;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry budget and backoff shape
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Randomize each delay within [delay/2, delay]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Backoff before attempt `attempt + 1`, without jitter
    ///
    /// base * 2^(attempt-1), capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }
}

/// Run `operation` until it succeeds, fails non-transiently, or the budget runs out.
///
/// Cancellation is honored between attempts and during backoff sleeps.
///
/// # Returns
/// The operation's value, the first non-transient error, the last transient
/// error once `max_attempts` is exhausted, or `ProviderError::Cancelled`.
pub async fn retry_transient<F, Fut, T>(
    provider: ProviderId,
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled(provider));
        }

        if attempt > 1 {
            tracing::debug!(
                provider = %provider,
                operation = operation_name,
                attempt,
                "Retrying provider request"
            );
        }

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        provider = %provider,
                        operation = operation_name,
                        attempt,
                        "Provider request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::error!(
                provider = %provider,
                operation = operation_name,
                attempt,
                error = %err,
                "Retry budget exhausted"
            );
            return Err(err);
        }

        let delay = policy.delay(attempt);
        tracing::warn!(
            provider = %provider,
            operation = operation_name,
            attempt,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Transient provider failure, will retry after backoff"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled(provider)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ProviderError {
        ProviderError::TransientFetch {
            provider: ProviderId::OfficeA,
            message: "503".into(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            jitter: false,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.delay(2);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let cancel = CancellationToken::new();
        let result = retry_transient(
            ProviderId::OfficeA,
            "page",
            &RetryPolicy::immediate(3),
            &cancel,
            || async { Ok::<_, ProviderError>(7) },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let c = calls.clone();
        let result = retry_transient(
            ProviderId::OfficeA,
            "page",
            &RetryPolicy::immediate(4),
            &cancel,
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let c = calls.clone();
        let result: Result<(), _> = retry_transient(
            ProviderId::OfficeA,
            "page",
            &RetryPolicy::immediate(3),
            &cancel,
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
        )
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let c = calls.clone();
        let result: Result<(), _> = retry_transient(
            ProviderId::OfficeB,
            "page",
            &RetryPolicy::immediate(5),
            &cancel,
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::Authentication {
                        provider: ProviderId::OfficeB,
                        message: "401".into(),
                    })
                }
            },
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Authentication { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = retry_transient(
            ProviderId::OfficeC,
            "page",
            &RetryPolicy::immediate(3),
            &cancel,
            || async { Ok::<_, ProviderError>(1) },
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Cancelled(ProviderId::OfficeC))));
    }
}
