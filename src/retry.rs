//! Small fixed-attempt retry helper with exponential backoff.
//! Shared by source downloads and publish channels.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u8, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based): base * 2^(attempt-1).
    pub fn backoff(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Outcome classification returned by an operation's error.
pub trait Retriable {
    fn is_retriable(&self) -> bool;

    /// Server-provided wait hint (e.g. HTTP 429 `retry_after`).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retriable for anyhow::Error {
    fn is_retriable(&self) -> bool {
        true
    }
}

/// Run `op` until it succeeds, returns a non-retriable error, or attempts run out.
pub async fn with_backoff<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Retriable + std::fmt::Display,
    F: FnMut(u8) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !e.is_retriable() || attempt >= policy.max_attempts {
                    return Err(e);
                }
                let wait = e.retry_after().unwrap_or_else(|| policy.backoff(attempt));
                tracing::debug!(%e, attempt, wait_ms = wait.as_millis() as u64, "{what}: retrying");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    #[derive(Debug)]
    struct Fatal;
    impl std::fmt::Display for Fatal {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("fatal")
        }
    }
    impl Retriable for Fatal {
        fn is_retriable(&self) -> bool {
            false
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU8::new(0);
        let counter = &calls;
        let p = RetryPolicy::new(3, Duration::from_millis(1));
        let res: Result<(), anyhow::Error> = with_backoff(p, "test", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("boom"))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_stops_immediately() {
        let calls = AtomicU8::new(0);
        let counter = &calls;
        let p = RetryPolicy::new(5, Duration::from_millis(1));
        let res: Result<(), Fatal> = with_backoff(p, "test", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Fatal)
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(1));
        let res: Result<u8, anyhow::Error> = with_backoff(p, "test", |attempt| async move {
            if attempt < 2 {
                Err(anyhow::anyhow!("flaky"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(res.unwrap(), 2);
    }
}
