//! Bounded retry with exponential backoff.
//!
//! The wait after failed attempt `n` is `base_delay * 2^(n-1)`, capped at
//! `max_delay`. With the defaults (1 s base, 10 s cap, 3 attempts) a chunk
//! that always fails waits 1 s and then 2 s before it is given up on.
//!
//! No sleep follows the final attempt, so the retry observer fires at most
//! `max_attempts - 1` times.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 3.
    pub max_attempts: u32,
    /// Wait after the first failure. Default: 1000 ms.
    pub base_delay: Duration,
    /// Upper bound for any single wait. Default: 10 000 ms.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A value (or error) together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Retry `op` on every error, see [`retry_if`].
pub async fn retry_with_backoff<T, E, F, Fut, O>(
    policy: &RetryPolicy,
    op: F,
    on_retry: O,
) -> Result<Attempted<T>, Attempted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(u32, &E),
{
    retry_if(policy, op, |_| true, on_retry).await
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or the
/// attempt budget is spent.
///
/// `op` receives the 1-based attempt number. `on_retry(attempt, &err)` is
/// invoked before each backoff sleep with the attempt that just failed.
pub async fn retry_if<T, E, F, Fut, P, O>(
    policy: &RetryPolicy,
    mut op: F,
    should_retry: P,
    mut on_retry: O,
) -> Result<Attempted<T>, Attempted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    O: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(Attempted {
                        value: err,
                        attempts: attempt,
                    });
                }
                on_retry(attempt, &err);
                sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(12),
        }
    }

    #[test]
    fn delays_double_until_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(4), Duration::from_millis(8000));
        assert_eq!(p.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(p.delay_for(40), Duration::from_millis(10_000));
    }

    #[test]
    fn delays_never_decrease() {
        let p = fast_policy(10);
        let delays: Vec<_> = (1..10).map(|a| p.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    }

    #[tokio::test]
    async fn always_failing_op_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let mut observed = Vec::new();

        let result: Result<Attempted<()>, _> = retry_with_backoff(
            &fast_policy(3),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("down") }
            },
            |attempt, err: &&str| observed.push((attempt, err.to_string())),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.value, "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(observed, vec![(1, "down".to_string()), (2, "down".to_string())]);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let start = Instant::now();
        let result = retry_with_backoff(
            &fast_policy(5),
            |attempt| async move {
                if attempt < 3 {
                    Err("flaky")
                } else {
                    Ok(attempt * 10)
                }
            },
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(result.value, 30);
        assert_eq!(result.attempts, 3);
        // 5 ms + 10 ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<Attempted<()>, _> = retry_if(
            &fast_policy(5),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("fatal") }
            },
            |e| *e != "fatal",
            |_, _| panic!("observer must not run"),
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let result = retry_with_backoff(&fast_policy(0), |_| async { Ok::<_, ()>(1) }, |_, _| {})
            .await
            .unwrap();
        assert_eq!(result.attempts, 1);
    }
}
