//! Query debug logging, enabled per-query via [`crate::query::Query::debug_mode`].
//!
//! Grounded on the teacher's habit of a single structured-log call point
//! rather than scattering `println!`/`eprintln!` through the query path.
//! A no-op when the `debug-log` feature is off, so call sites don't need
//! `#[cfg]` of their own.

/// One query's debug snapshot: the rendered SQL, how many parameters it
/// bound, and whether the prepared-statement cache served it.
#[derive(Debug, Clone)]
pub struct QueryDebugInfo<'a> {
    pub sql: &'a str,
    pub param_count: usize,
    pub cache_hit: bool,
    pub used_transaction: bool,
}

#[cfg(feature = "debug-log")]
pub fn log_query(info: &QueryDebugInfo<'_>) {
    tracing::debug!(
        sql = %info.sql,
        param_count = info.param_count,
        cache_hit = info.cache_hit,
        used_transaction = info.used_transaction,
        "executing ecs query"
    );
}

#[cfg(not(feature = "debug-log"))]
pub fn log_query(_info: &QueryDebugInfo<'_>) {}
