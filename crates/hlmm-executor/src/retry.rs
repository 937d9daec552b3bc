//! Timeout and retry wrapper for venue requests.

use std::future::Future;
use std::time::Duration;

use hlmm_mm::MakerConfig;
use hlmm_telemetry::Metrics;
use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{ExecutorError, ExecutorResult, VenueResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &MakerConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// Run `op` under the policy's timeout, retrying timeouts and transient
/// errors with exponential backoff.
///
/// Fatal venue errors return immediately. Running out of attempts yields
/// `ExecutorError::RequestTimeout`.
pub async fn with_retry<T, F, Fut>(
    request: &'static str,
    policy: &RetryPolicy,
    mut op: F,
) -> ExecutorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let started = Instant::now();
        let result = tokio::time::timeout(policy.timeout, op()).await;
        Metrics::request_latency(request, started.elapsed().as_secs_f64() * 1000.0);

        let last = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_retryable() => return Err(ExecutorError::Venue(e)),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no response within {}ms", policy.timeout.as_millis()),
        };

        if attempt > policy.max_retries {
            Metrics::request_timeout(request);
            return Err(ExecutorError::RequestTimeout {
                request,
                attempts: attempt,
                last,
            });
        }

        let delay = calculate_backoff_delay(attempt, policy.base_delay_ms, policy.max_delay_ms);
        warn!(
            request,
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %last,
            "Venue request failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// base * 2^(attempt-1), capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + jitter(delay / 10))
}

/// Random jitter in `0..=bound_ms`.
fn jitter(bound_ms: u64) -> u64 {
    if bound_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=bound_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenueError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 50,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let d1 = calculate_backoff_delay(1, 200, 2000).as_millis();
        let d2 = calculate_backoff_delay(2, 200, 2000).as_millis();
        let d5 = calculate_backoff_delay(5, 200, 2000).as_millis();
        let d40 = calculate_backoff_delay(40, 200, 2000).as_millis();

        assert!((200..=220).contains(&d1));
        assert!((400..=440).contains(&d2));
        assert!((2000..=2200).contains(&d5));
        assert!((2000..=2200).contains(&d40));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        assert_eq!(jitter(0), 0);
        let samples: Vec<u64> = (0..200).map(|_| jitter(20)).collect();
        assert!(samples.iter().all(|j| *j <= 20));
        // 200 draws from 21 values are not all equal.
        assert!(samples.iter().any(|j| *j != samples[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("submit", &policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VenueError::Transient("busy".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ExecutorResult<()> = with_retry("cancel", &policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VenueError::Fatal("bad request".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ExecutorError::Venue(VenueError::Fatal(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_into_request_timeout() {
        let calls = AtomicU32::new(0);
        let result: ExecutorResult<()> = with_retry("open_orders", &policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;

        match result {
            Err(ExecutorError::RequestTimeout {
                request, attempts, ..
            }) => {
                assert_eq!(request, "open_orders");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
