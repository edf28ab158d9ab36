// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Exponential backoff retry for network operations. The delay formula and jitter
//! behaviour match the reference implementation's `retry_with_backoff` exactly:
//! `delay = min(base * 2^attempt, max)`, then if jitter is enabled
//! `delay = min(delay * (0.5 + U(0,1)), max)`.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let mut delay = (base * 2f64.powi(attempt as i32)).min(max);
        if self.jitter {
            let jitter_factor = 0.5 + rand::rng().random::<f64>();
            delay = (delay * jitter_factor).min(max);
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Run `op` up to `policy.max_retries + 1` times, retrying only on errors for which
/// `is_retryable` returns `true`. Sleeps between attempts using exponential backoff.
/// Returns the last error once retries are exhausted or `is_retryable` returns
/// `false`.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut last_err: Option<E> = None;
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_retries || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "retrying after failure");
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }
    // unreachable in practice: the loop above always returns on its last iteration
    Err(last_err.expect("retry loop always produces an error before falling through"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_is_exponential_and_capped() {
        let p = RetryPolicy { max_retries: 5, base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(10), jitter: false };
        assert_eq!(p.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(10), Duration::from_secs(10)); // capped
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), jitter: false };
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err("transient") } else { Ok(42) }
        }).await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_when_not_retryable() {
        let policy = RetryPolicy::default();
        let result: Result<u32, &str> = retry_with_backoff(&policy, |_| false, || async { Err("permanent") }).await;
        assert_eq!(result, Err("permanent"));
    }
}
