//! Database connection and pool management
//!
//! This module handles PostgreSQL connection pooling, migrations and the
//! guarded runner every core transition goes through.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::{DomainError, DomainResult};

/// Database connection error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("Failed to run migrations: {0}")]
    MigrationError(String),

    #[error("Database health check failed: {0}")]
    HealthCheckError(String),
}

/// Create a database connection pool
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!("Connecting to database at {}", config.database_url_masked());

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    tracing::info!("Database connection pool created successfully");

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!("Database migrations completed successfully");

    Ok(())
}

/// Check database connectivity (for health checks)
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::HealthCheckError(e.to_string()))?;

    Ok(())
}

/// Largest page size any list endpoint returns
pub const MAX_PAGE_SIZE: i64 = 100;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Normalised `(page, limit)`. Page starts at 1 and is capped so that
/// `(page - 1) * limit` always fits an `i64` OFFSET.
pub fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, i64::MAX / limit);
    (page, limit)
}

/// `%term%` for ILIKE with `\`, `%` and `_` taken literally.
/// Use with `ESCAPE '\'`.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Bound a read-only unit of work by the caller's deadline
pub async fn with_deadline<T, Fut>(
    operation: &'static str,
    timeout: Duration,
    work: Fut,
) -> DomainResult<T>
where
    Fut: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(deadline_exceeded(operation, timeout)),
    }
}

fn deadline_exceeded(operation: &'static str, timeout: Duration) -> DomainError {
    tracing::warn!(operation, timeout_ms = %timeout.as_millis(), "Operation timed out");
    DomainError::Unavailable(format!(
        "{} did not finish within {} ms",
        operation,
        timeout.as_millis()
    ))
}

/// Run one unit of work under a deadline, re-running it once on a
/// transaction conflict.
///
/// `attempt` must open, use and commit its own transaction. If the deadline
/// fires first the in-flight future is dropped, which rolls the transaction
/// back before anything was committed.
pub async fn run_guarded<T, F, Fut>(
    operation: &'static str,
    timeout: Duration,
    mut attempt: F,
) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let guarded = async {
        match attempt().await {
            Err(err) if err.is_retryable() => {
                tracing::warn!(operation, error = %err, "Transaction conflict, retrying once");
                attempt().await
            }
            other => other,
        }
    };

    with_deadline(operation, timeout, guarded).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_conflict_is_retried_exactly_once() {
        let calls = AtomicUsize::new(0);

        let result: DomainResult<()> = run_guarded("test", Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DomainError::Conflict("serialization failure".into())) }
        })
        .await;

        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);

        let result: DomainResult<()> = run_guarded("test", Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DomainError::IncompleteAppraisal) }
        })
        .await;

        assert_eq!(result, Err(DomainError::IncompleteAppraisal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_attempt_can_succeed() {
        let calls = AtomicUsize::new(0);

        let result = run_guarded("test", Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DomainError::Conflict("retry me".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_deadline_maps_to_unavailable() {
        let result: DomainResult<()> = run_guarded("slow", Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DomainError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_read_deadline_maps_to_unavailable() {
        let result: DomainResult<()> = with_deadline("slow read", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DomainError::Unavailable(_))));
    }

    #[test]
    fn test_page_window_defaults_and_clamps() {
        assert_eq!(page_window(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(page_window(Some(0), Some(500)), (1, MAX_PAGE_SIZE));
        assert_eq!(page_window(Some(3), Some(0)), (3, 1));
    }

    #[test]
    fn test_huge_page_keeps_offset_in_range() {
        for limit in [1, 20, MAX_PAGE_SIZE] {
            let (page, limit) = page_window(Some(i64::MAX), Some(limit));
            assert!((page - 1).checked_mul(limit).is_some());
        }
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("LN-2024"), "%LN-2024%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }
}
