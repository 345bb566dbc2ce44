//! Transaction helpers.
//!
//! Prefer passing a transaction (`tokio_postgres::Transaction` or
//! `deadpool_postgres::Transaction`) into APIs that accept [`crate::client::GenericClient`].
//! This keeps query execution easy to compose with or without transactions.
//!
//! For ergonomic commit/rollback handling, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! use ecsql::QueryResult;
//! use tokio_postgres::NoTls;
//!
//! # async fn demo() -> QueryResult<()> {
//! let (mut client, connection) = tokio_postgres::connect("postgres://...", NoTls).await?;
//! tokio::spawn(async move { let _ = connection.await; });
//!
//! ecsql::transaction!(&mut client, tx, {
//!     tx.execute("UPDATE accounts SET balance = balance - $1 WHERE id = $2", &[&100_i64, &1_i64])
//!         .await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `ecsql::QueryResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($client)
            .transaction()
            .await
            .map_err(|e| $crate::QueryError::from_db_error("BEGIN", e))?;

        let __ecsql_tx_body_result = async { $body }.await;
        match __ecsql_tx_body_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err(|e| $crate::QueryError::from_db_error("COMMIT", e))?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::QueryError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
