//! Caller-side retry of transient render failures.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{RenderError, RenderResult};

/// Errors raised when a retry policy is misconfigured.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetryPolicyError {
    /// Scaling must not shrink the delay.
    #[error("the scaling value ({0}) should be a finite number >= 1.0")]
    InvalidScalingFactor(f64),
    /// The first delay must be positive.
    #[error("the initial delay ({0:?}) should be greater than zero")]
    InvalidInitialDelay(Duration),
    /// The maximum delay must not be below the initial delay.
    #[error(
        "the maximum delay ({maximum:?}) should be greater than or equal to the initial delay ({initial:?})"
    )]
    EmptyRange {
        /// Configured maximum delay.
        maximum: Duration,
        /// Configured initial delay.
        initial: Duration,
    },
}

/// Exponential backoff applied to [`RenderError::Transient`] failures only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    initial_delay: Duration,
    max_delay: Duration,
    scaling: f64,
}

impl RetryPolicy {
    /// Three attempts starting at 100ms, doubling up to 2s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: match NonZeroU32::new(3) {
                Some(attempts) => attempts,
                None => unreachable!(),
            },
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            scaling: 2.0,
        }
    }

    /// A policy that runs the operation exactly once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new().with_max_attempts(NonZeroU32::MIN)
    }

    /// Sets the total number of attempts, including the first.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: NonZeroU32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the second attempt.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps every delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor between consecutive delays.
    #[must_use]
    pub const fn with_scaling(mut self, scaling: f64) -> Self {
        self.scaling = scaling;
        self
    }

    /// Total number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    /// Checks the delay range and scaling factor.
    ///
    /// # Errors
    ///
    /// Returns a [`RetryPolicyError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if !self.scaling.is_finite() || self.scaling < 1.0 {
            return Err(RetryPolicyError::InvalidScalingFactor(self.scaling));
        }
        if self.initial_delay.is_zero() {
            return Err(RetryPolicyError::InvalidInitialDelay(self.initial_delay));
        }
        if self.max_delay < self.initial_delay {
            return Err(RetryPolicyError::EmptyRange {
                maximum: self.max_delay,
                initial: self.initial_delay,
            });
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.scaling.powi(exponent);
        if scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(scaled).unwrap_or(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `operation` until it succeeds, fails permanently, or attempts run out.
///
/// The closure receives the 1-based attempt number. Only
/// [`RenderError::Transient`] failures are retried; cancelling `cancel` during a
/// backoff sleep returns [`RenderError::Cancelled`].
///
/// # Errors
///
/// Returns the last error produced by `operation`, or
/// [`RenderError::Cancelled`] when cancelled between attempts.
pub async fn retry_render<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RenderResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RenderResult<T>>,
{
    let max_attempts = policy.max_attempts().get();
    let mut attempt = 1;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, max_attempts, ?delay, error = %err, "transient render failure, retrying");
        tokio::select! {
            () = cancel.cancelled() => return Err(RenderError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> RenderError {
        RenderError::Transient {
            resource: None,
            reason: "unavailable".into(),
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350))
            .with_scaling(2.0);

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_millis(350));
    }

    #[test]
    fn validation() {
        assert!(RetryPolicy::new().validate().is_ok());
        assert!(matches!(
            RetryPolicy::new().with_scaling(0.5).validate(),
            Err(RetryPolicyError::InvalidScalingFactor(_))
        ));
        assert!(matches!(
            RetryPolicy::new().with_initial_delay(Duration::ZERO).validate(),
            Err(RetryPolicyError::InvalidInitialDelay(_))
        ));
        assert!(matches!(
            RetryPolicy::new()
                .with_initial_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(1))
                .validate(),
            Err(RetryPolicyError::EmptyRange { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy::new().with_max_attempts(NonZeroU32::new(4).unwrap());

        let value = retry_render(&policy, &CancellationToken::new(), move |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 { Err(transient()) } else { Ok(attempt) }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = retry_render(&RetryPolicy::new(), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_render(&RetryPolicy::new(), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(RenderError::MalformedReference {
                    path: "/a".into(),
                    reason: "bad".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RenderError::MalformedReference { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new().with_initial_delay(Duration::from_secs(30));
        let trigger = cancel.clone();

        let err = retry_render(&policy, &cancel, |_| {
            trigger.cancel();
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, RenderError::Cancelled);
    }
}
