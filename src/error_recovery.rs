// src/error_recovery.rs
//! Retry with exponential backoff for API operations.

use crate::error::AppError;
use rand::Rng;
use std::time::Duration;

/// How many times, and how patiently, a request is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::FETCH_MAX_ATTEMPTS,
            initial_delay: crate::constants::RETRY_INITIAL_DELAY,
            max_delay: crate::constants::RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Retries an async operation with exponential backoff.
///
/// Only transient failures are retried; anything else is returned at once.
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    policy: RetryPolicy,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt < policy.max_attempts {
                    let pause = with_jitter(delay);
                    log::warn!(
                        "Attempt {} failed ({}), retrying after {:?}",
                        attempt,
                        e,
                        pause
                    );
                    tokio::time::sleep(pause).await;

                    // Exponential backoff with cap
                    delay = std::cmp::min(delay * 2, policy.max_delay);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::InternalError {
        message: "Retry failed with no error".to_string(),
        source: None,
    }))
}

/// Spreads retries of concurrent callers by up to a quarter of the delay.
fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 4;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::TransientFetch {
                        endpoint: "blocks".to_string(),
                        cause: "timeout".to_string(),
                    })
                } else {
                    Ok(7)
                }
            },
            RetryPolicy::immediate(3),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AppError> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Permission {
                    resource: "doc".to_string(),
                    message: "denied".to_string(),
                })
            },
            RetryPolicy::immediate(3),
        )
        .await;

        assert!(matches!(result, Err(AppError::Permission { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let result: Result<(), AppError> = retry_with_backoff(
            || async {
                Err(AppError::TransientFetch {
                    endpoint: "blocks".to_string(),
                    cause: "503".to_string(),
                })
            },
            RetryPolicy::immediate(2),
        )
        .await;

        assert!(matches!(result, Err(AppError::TransientFetch { .. })));
    }
}
