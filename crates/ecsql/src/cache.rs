//! `PreparedStatementCache`: avoids re-running the DAG planner for
//! structurally identical queries.
//!
//! Keyed on [`crate::query::QueryContext::generate_cache_key`] (shape only,
//! never bound values), so two queries differing only in filter literals
//! share an entry. Strict LRU eviction by `last_used` once `max_size` is
//! reached (Testable Property #8). Grounded on the hand-rolled-rather-than-
//! dependency style already used for [`crate::registry::SemVer`] — a
//! capacity-bounded `HashMap` needs no external `lru` crate.

use crate::client::GenericClient;
use crate::error::{QueryError, QueryResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

struct Entry {
    sql: Arc<str>,
    last_used: Instant,
    /// How long the original `build()` took — credited as "time saved" on
    /// every subsequent hit.
    planning_time: Duration,
}

/// A cached query's rendered SQL. Cheap to clone (wraps an `Arc<str>`).
#[derive(Debug, Clone)]
pub struct StatementHandle(Arc<str>);

impl StatementHandle {
    pub fn sql(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_planning_time_saved: Duration,
    pub average_planning_time_saved: Duration,
}

/// `ToSql` gives no generic way to downcast a bound parameter back to its
/// concrete type, but it requires `Debug` — an empty string's `Debug` output
/// is always the literal `""`, regardless of whether it arrived as `&str`,
/// `String`, or `Option<String>`'s `Some` variant. Non-string params (ids are
/// never anything else in this crate, but numerics, bools, etc. could appear)
/// never format that way, so this can't false-positive on them.
fn is_empty_string_param(param: &(dyn ToSql + Sync)) -> bool {
    format!("{param:?}") == "\"\""
}

pub struct PreparedStatementCache {
    max_size: usize,
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    total_planning_time_saved: Mutex<Duration>,
}

impl PreparedStatementCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            total_planning_time_saved: Mutex::new(Duration::ZERO),
        }
    }

    /// Look up `key`; on a miss, call `build` to generate the SQL and insert
    /// it. Returns the handle plus whether this was a hit.
    pub fn get_or_create(
        &self,
        key: &str,
        build: impl FnOnce() -> QueryResult<String>,
    ) -> QueryResult<(StatementHandle, bool)> {
        {
            let mut entries = self.entries.write().expect("statement cache lock poisoned");
            if let Some(entry) = entries.get_mut(key) {
                entry.last_used = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                *self
                    .total_planning_time_saved
                    .lock()
                    .expect("statement cache lock poisoned") += entry.planning_time;
                return Ok((StatementHandle(entry.sql.clone()), true));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let sql = build()?;
        let planning_time = start.elapsed();
        let sql: Arc<str> = Arc::from(sql);
        self.insert(key.to_string(), sql.clone(), planning_time);
        Ok((StatementHandle(sql), false))
    }

    fn insert(&self, key: String, sql: Arc<str>, planning_time: Duration) {
        let mut entries = self.entries.write().expect("statement cache lock poisoned");
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(
            key,
            Entry {
                sql,
                last_used: Instant::now(),
                planning_time,
            },
        );
    }

    pub async fn execute(
        &self,
        handle: &StatementHandle,
        params: &[&(dyn ToSql + Sync)],
        client: &impl GenericClient,
    ) -> QueryResult<Vec<Row>> {
        for (idx, param) in params.iter().enumerate() {
            if is_empty_string_param(*param) {
                return Err(QueryError::invalid_filter(
                    idx + 1,
                    handle.sql(),
                    "parameter must not be an empty string",
                ));
            }
        }
        client.query(handle.sql(), params).await
    }

    /// Drops every cached entry whose key mentions `type_id` — cache keys
    /// embed component type-ids verbatim (see `generate_cache_key`), so a
    /// substring match is enough.
    pub fn invalidate_by_component(&self, type_id: &str) {
        let mut entries = self.entries.write().expect("statement cache lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| !key.contains(type_id));
        let removed = before - entries.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .expect("statement cache lock poisoned")
            .clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("statement cache lock poisoned");
        let hits = self.hits.load(Ordering::Relaxed);
        let total_saved = *self
            .total_planning_time_saved
            .lock()
            .expect("statement cache lock poisoned");
        let average_saved = if hits > 0 {
            total_saved / hits as u32
        } else {
            Duration::ZERO
        };
        CacheStats {
            size: entries.len(),
            max_size: self.max_size,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            total_planning_time_saved: total_saved,
            average_planning_time_saved: average_saved,
        }
    }

    /// Pre-populates the cache with already-known `(key, sql)` pairs, e.g. at
    /// startup so the first real request isn't the one paying to plan.
    pub async fn warm_up(
        &self,
        queries: &[(String, String)],
        _client: &impl GenericClient,
    ) -> QueryResult<()> {
        for (key, sql) in queries {
            self.get_or_create(key, || Ok(sql.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullClient;
    impl GenericClient for NullClient {
        async fn query(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<Vec<Row>> {
            Ok(Vec::new())
        }
        async fn query_one(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<Row> {
            unreachable!("not exercised in these tests")
        }
        async fn query_opt(
            &self,
            _sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> QueryResult<Option<Row>> {
            Ok(None)
        }
        async fn execute(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn first_lookup_is_a_miss_second_is_a_hit() {
        let cache = PreparedStatementCache::new(10);
        let (_, hit1) = cache.get_or_create("k1", || Ok("SELECT 1".to_string())).unwrap();
        let (_, hit2) = cache.get_or_create("k1", || Ok("SELECT 1".to_string())).unwrap();
        assert!(!hit1);
        assert!(hit2);
        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn eviction_drops_the_least_recently_used_entry() {
        let cache = PreparedStatementCache::new(2);
        cache.get_or_create("a", || Ok("A".to_string())).unwrap();
        cache.get_or_create("b", || Ok("B".to_string())).unwrap();
        // touch "a" so "b" becomes the least recently used
        cache.get_or_create("a", || Ok("A".to_string())).unwrap();
        cache.get_or_create("c", || Ok("C".to_string())).unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.evictions, 1);

        let (handle, hit) = cache.get_or_create("a", || Ok("A".to_string())).unwrap();
        assert!(hit);
        assert_eq!(handle.sql(), "A");
    }

    #[test]
    fn invalidate_by_component_matches_on_key_substring() {
        let cache = PreparedStatementCache::new(10);
        cache
            .get_or_create("req=[t1]|exc=[]", || Ok("SELECT 1".to_string()))
            .unwrap();
        cache
            .get_or_create("req=[t2]|exc=[]", || Ok("SELECT 2".to_string()))
            .unwrap();
        cache.invalidate_by_component("t1");
        let stats = cache.get_stats();
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn execute_runs_the_cached_sql_through_the_client() {
        let cache = PreparedStatementCache::new(10);
        let (handle, _) = cache
            .get_or_create("k", || Ok("SELECT 1".to_string()))
            .unwrap();
        let client = NullClient;
        let rows = cache.execute(&handle, &[], &client).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn execute_rejects_an_empty_string_parameter() {
        let cache = PreparedStatementCache::new(10);
        let (handle, _) = cache
            .get_or_create("k", || Ok("SELECT 1".to_string()))
            .unwrap();
        let client = NullClient;
        let empty = String::new();
        let params: Vec<&(dyn ToSql + Sync)> = vec![&empty];
        let err = cache.execute(&handle, &params, &client).await.unwrap_err();
        assert!(matches!(err, crate::error::QueryError::InvalidFilterValue { .. }));
    }
}
