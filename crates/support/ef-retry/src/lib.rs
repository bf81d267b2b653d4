//! Retry logic for remote operations.
//!
//! Provides exponential backoff with jitter and two profiles:
//! - [`RetryConfig::short`] for HTTP-scale calls (1s start, 10s cap, 10 attempts)
//! - [`RetryConfig::long`] for multi-minute uploads (5s start, 8 attempts)
//!
//! Retries can be switched off process-wide with [`disable_retries`].

use ef_error::{classify_error, classify_message, ErrorCategory, ExportError};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

static RETRIES_DISABLED: AtomicBool = AtomicBool::new(false);

/// Turns every retry loop into a single attempt.
pub fn disable_retries() {
    RETRIES_DISABLED.store(true, Ordering::SeqCst);
}

/// Re-enables retries after [`disable_retries`].
pub fn enable_retries() {
    RETRIES_DISABLED.store(false, Ordering::SeqCst);
}

pub fn retries_disabled() -> bool {
    RETRIES_DISABLED.load(Ordering::SeqCst)
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether to add jitter to backoff times.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::short()
    }
}

impl RetryConfig {
    /// Profile for HTTP-scale operations.
    pub fn short() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }

    /// Profile for long-running transfers.
    pub fn long() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 5_000,
            max_backoff_ms: 5_000 * 2u64.pow(7),
            jitter: true,
        }
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial backoff in milliseconds.
    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Set the maximum backoff in milliseconds.
    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the backoff duration after a failed attempt (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = base_ms.min(self.max_backoff_ms);

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4; // 25% jitter
            let jitter = rand::rng().random_range(0..=jitter_range);
            capped_ms.saturating_add(jitter)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Decides whether an error is worth another attempt.
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ExportError {
    fn is_retryable(&self) -> bool {
        classify_error(self) == ErrorCategory::Transient
    }
}

impl Retryable for String {
    fn is_retryable(&self) -> bool {
        classify_message(self) == ErrorCategory::Transient
    }
}

impl Retryable for &str {
    fn is_retryable(&self) -> bool {
        classify_message(self) == ErrorCategory::Transient
    }
}

/// Execute an async operation with retry logic.
///
/// Every retry logs a warning naming the operation and the error. The last
/// error is returned once attempts are exhausted or a permanent error occurs.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    let max_attempts = if retries_disabled() {
        1
    } else {
        config.max_attempts.max(1)
    };
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %e,
                        "Non-retryable error"
                    );
                    return Err(e);
                }

                attempt += 1;
                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(e);
                }

                let backoff = config.backoff_duration(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis(),
                    "Retryable error, backing off"
                );
                sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_profiles() {
        let short = RetryConfig::short();
        assert_eq!(short.max_attempts, 10);
        assert_eq!(short.initial_backoff_ms, 1_000);
        assert_eq!(short.max_backoff_ms, 10_000);

        let long = RetryConfig::long();
        assert_eq!(long.max_attempts, 8);
        assert_eq!(long.initial_backoff_ms, 5_000);
    }

    #[test]
    fn test_backoff_duration_capped() {
        let config = RetryConfig::short().with_jitter(false);

        assert_eq!(config.backoff_duration(0), Duration::from_millis(1000));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_duration(3), Duration::from_millis(8000));
        assert_eq!(config.backoff_duration(4), Duration::from_millis(10000));
        assert_eq!(config.backoff_duration(40), Duration::from_millis(10000));
    }

    #[test]
    fn test_export_error_retryable() {
        assert!(!ExportError::config("bad").is_retryable());
        assert!(ExportError::writer("connection reset by peer").is_retryable());
        assert!(!"InvalidRequest: bad range".to_string().is_retryable());
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retry() {
        let config = RetryConfig::short()
            .with_initial_backoff_ms(1)
            .with_jitter(false);
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<i32, String> = with_retry(&config, "test_op", || {
            let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("timeout error".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_attempts() {
        let config = RetryConfig::short()
            .with_max_attempts(3)
            .with_initial_backoff_ms(1)
            .with_jitter(false);
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<i32, String> = with_retry(&config, "test_op", || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err("SlowDown".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error() {
        let config = RetryConfig::short();
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<i32, String> = with_retry(&config, "test_op", || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err("NoSuchKey: key not found".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
