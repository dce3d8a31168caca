//! Retry with configurable backoff for remote classifier calls.

use std::time::Duration;

use convoflow_types::{ConvoflowError, Result};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
                let millis = base_ms.saturating_mul(2u64.saturating_pow(exponent));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }

    /// Delay before retrying after `err`. A rate-limit hint from the server
    /// wins when it is longer than the policy's own delay, except under
    /// [`BackoffPolicy::None`].
    fn delay_after(&self, err: &ConvoflowError, attempt: usize) -> Duration {
        let base = self.delay_for_attempt(attempt);
        match (self, err) {
            (BackoffPolicy::None, _) => Duration::ZERO,
            (_, ConvoflowError::RateLimited { retry_after_ms, .. }) => {
                base.max(Duration::from_millis(*retry_after_ms))
            }
            _ => base,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(250),
            max: Duration::from_secs(8),
        }
    }
}

/// Run `f` up to `max_retries + 1` times, retrying only errors for which
/// [`ConvoflowError::is_retryable`] holds.
pub async fn with_retry<F, Fut, T>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    operation: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_after(&e, attempt);
                tracing::warn!(operation, attempt, delay_ms = %delay.as_millis(), error = %e, "Retryable error, retrying");
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ConvoflowError::RetriesExhausted {
        operation: operation.to_string(),
        attempts: max_retries + 1,
    }))
}
