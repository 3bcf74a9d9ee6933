//! Database transaction utilities
//!
//! Multi-statement writes (a file plus its upload slots) go through
//! `with_transaction` so they land atomically.

use chunkvault_core::AppError;
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};

/// Execute a closure within a database transaction
///
/// Begins a transaction, runs the closure, and commits if it succeeds. On error the
/// transaction is rolled back and the closure's error is returned unchanged.
///
/// # Example
///
/// ```ignore
/// use chunkvault_db::with_transaction;
///
/// async fn example(pool: &sqlx::PgPool) -> Result<(), chunkvault_core::AppError> {
///     with_transaction(pool, |tx| {
///         Box::pin(async move {
///             sqlx::query("INSERT INTO ...").execute(&mut **tx).await?;
///             sqlx::query("UPDATE ...").execute(&mut **tx).await?;
///             Ok(())
///         })
///     })
///     .await
/// }
/// ```
pub async fn with_transaction<F, R>(pool: &PgPool, f: F) -> Result<R, AppError>
where
    F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> BoxFuture<'c, Result<R, AppError>>,
{
    let mut tx = pool.begin().await?;

    match f(&mut tx).await {
        Ok(result) => {
            tx.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(e)
        }
    }
}
