//! Bounded retry with constant delay for outbound calls.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

/// Attempt cap and inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt cap is reached. The caller sees the last attempt's outcome.
pub async fn with_retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&anyhow::Error) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    "connection timed out, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(call = label, attempt, max_attempts, error = %format!("{err:#}"), "call failed");
                return Err(err);
            }
        }
    }
}

/// Connection-timeout-class failures: a timed-out HTTP request or an I/O
/// timeout anywhere in the error chain.
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
            return http.is_timeout();
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::TimedOut;
        }
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use std::cell::Cell;
    use std::io;

    fn timed_out() -> anyhow::Error {
        anyhow::Error::new(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_timeouts_up_to_cap() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();
        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", is_timeout, || {
            calls.set(calls.get() + 1);
            async { Err(timed_out()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_surfaces_immediately() {
        let calls = Cell::new(0u32);
        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", is_timeout, || {
            calls.set(calls.get() + 1);
            async { Err(anyhow!("500 internal error")) }
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "500 internal error");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_timeout_is_returned() {
        let calls = Cell::new(0u32);
        let result = with_retry(&RetryPolicy::default(), "test", is_timeout, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 2 {
                    Err(timed_out())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .expect("second attempt succeeds");
        assert_eq!(result, 2);
    }

    #[test]
    fn timeout_detection_walks_context_chain() {
        let wrapped = Err::<(), _>(timed_out())
            .context("post ttft")
            .unwrap_err();
        assert!(is_timeout(&wrapped));
        assert!(!is_timeout(&anyhow!("connection refused")));
    }
}
