//! Retry for SQLite lock contention
//!
//! Concurrent import runs share one catalog file, so a writer can see
//! "database is locked" while another run holds the write lock. Those errors
//! are retried with doubling backoff until `max_wait_ms` has elapsed; every
//! other error is returned on the first attempt.

use libris_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

const FIRST_DELAY: Duration = Duration::from_millis(10);
const DELAY_CAP: Duration = Duration::from_millis(1000);

/// Retries above this total wait are logged at WARN even when they succeed
const SLOW_RETRY: Duration = Duration::from_secs(2);

struct Backoff {
    started: Instant,
    budget: Duration,
    delay: Duration,
    attempts: u32,
}

impl Backoff {
    fn new(max_wait_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_millis(max_wait_ms),
            delay: FIRST_DELAY,
            attempts: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    async fn wait(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.delay = (self.delay * 2).min(DELAY_CAP);
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or the
/// lock wait budget is spent
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(max_wait_ms);

    loop {
        backoff.attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if backoff.attempts > 1 {
                    let elapsed = backoff.started.elapsed();
                    if elapsed > SLOW_RETRY {
                        tracing::warn!(
                            operation = operation_name,
                            attempts = backoff.attempts,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Database operation succeeded after a long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempts = backoff.attempts,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let elapsed_ms = backoff.started.elapsed().as_millis() as u64;
        if backoff.exhausted() {
            tracing::error!(
                operation = operation_name,
                attempts = backoff.attempts,
                elapsed_ms,
                max_wait_ms,
                error = %err,
                "Giving up on locked database"
            );
            return Err(Error::Internal(format!(
                "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                backoff.attempts, elapsed_ms, max_wait_ms
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempts = backoff.attempts,
            elapsed_ms,
            delay_ms = backoff.delay.as_millis() as u64,
            "Database locked, retrying"
        );
        backoff.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[tokio::test]
    async fn test_first_success_is_returned() {
        let value = retry_on_lock("op", 1000, || async { Ok::<_, Error>(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_lock_errors_are_retried() {
        let calls = AtomicU32::new(0);

        let value = retry_on_lock("op", 5000, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(locked())
                } else {
                    Ok("written")
                }
            }
        })
        .await;

        assert_eq!(value.unwrap(), "written");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reports_lock() {
        let value = retry_on_lock("op", 40, || async { Err::<(), _>(locked()) }).await;

        match value {
            Err(Error::Internal(msg)) => assert!(msg.starts_with("Database locked after")),
            other => panic!("expected lock timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let value = retry_on_lock("op", 5000, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::InvalidInput("bad row".to_string())) }
        })
        .await;

        assert!(matches!(value, Err(Error::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
