//! Database lock retry
//!
//! SQLite serialises writers; under contention a write may fail with
//! "database is locked" even with a busy timeout. Writes that must land
//! (user-emotion recompute, queue claims) go through `retry_on_lock`.

use moody_common::{Error, Result};
use std::time::{Duration, Instant};

/// Default upper bound on the total time spent retrying
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Retry a database operation with exponential backoff until `max_wait_ms` elapses
///
/// Backoff starts at 10ms and doubles up to 1000ms. Errors other than a
/// lock error are returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED surface as database errors mentioning the lock
fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let message = db_err.to_string();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Internal("database is locked".to_string())) }
        })
        .await;

        // Only sqlx database errors are treated as lock contention
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lock_detection_ignores_other_database_errors() {
        assert!(!is_lock_error(&Error::Database(sqlx::Error::RowNotFound)));
        assert!(!is_lock_error(&Error::NotFound("x".to_string())));
    }
}
