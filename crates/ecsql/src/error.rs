//! Error types surfaced by the query engine.
//!
//! Every terminal operation (`exec`, `count`, `sum`, `average`, `estimated_count`,
//! `explain_analyze`) propagates one of these variants. Nothing is recovered
//! locally except prepared-statement cache misses, which are not errors.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A component class referenced in a query is not in the registry. Fatal for that query.
    #[error("unregistered component: {0}")]
    UnregisteredComponent(String),

    /// `CTENode` invoked with no required components. Programmer error.
    #[error("CTE node requires at least one required component")]
    EmptyRequiredSet,

    /// A filter parameter is empty/invalid, or failed a custom filter's `validate`.
    ///
    /// Carries the offending parameter index and SQL prefix for diagnostics, as
    /// required by the "fail fast, before the DB call" contract.
    #[error("invalid filter value at parameter ${param_index} (sql: {sql_prefix}): {reason}")]
    InvalidFilterValue {
        param_index: usize,
        sql_prefix: String,
        reason: String,
    },

    /// Custom-filter registration collided without a valid semver upgrade.
    #[error("operator '{operator}' is already registered by plugin '{existing_plugin}'")]
    OperatorConflict {
        operator: String,
        existing_plugin: String,
    },

    /// `OrNode` (or a filter condition) encountered an operator it does not know
    /// and no custom builder is registered for it.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A terminal operation exceeded its 30-second execution budget.
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    /// Any driver-level failure, propagated with the offending SQL prefix attached.
    #[error("database error while executing `{sql_prefix}`: {source}")]
    DatabaseError {
        sql_prefix: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A pooled-connection failure.
    #[cfg(feature = "pool")]
    #[error("pool error: {0}")]
    Pool(String),

    /// A structural/programmer-error validation failure (e.g. a malformed identifier
    /// or a builder invoked in an invalid state).
    #[error("validation error: {0}")]
    Validation(String),

    /// Catch-all for conditions that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unregistered_component(name: impl Into<String>) -> Self {
        Self::UnregisteredComponent(name.into())
    }

    pub fn invalid_filter(
        param_index: usize,
        sql_prefix: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterValue {
            param_index,
            sql_prefix: sql_prefix.into(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::QueryTimeout(_))
    }

    pub fn is_unregistered_component(&self) -> bool {
        matches!(self, Self::UnregisteredComponent(_))
    }

    /// Attach a SQL prefix to a raw driver error.
    ///
    /// The prefix is truncated so large generated queries don't blow up error
    /// messages/logs; 120 chars is enough to identify which query failed.
    pub fn from_db_error(sql: &str, err: tokio_postgres::Error) -> Self {
        let sql_prefix: String = sql.chars().take(120).collect();
        Self::DatabaseError {
            sql_prefix,
            source: err,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for QueryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
