//! `Query`: the fluent builder applications construct and execute.
//!
//! Mutates a [`QueryContext`], builds a [`QueryDAG`] from it, and runs the
//! resulting SQL through whatever [`GenericClient`] it was handed — a pooled
//! connection or a transaction, the caller doesn't need to care which.

use crate::cache::PreparedStatementCache;
use crate::client::GenericClient;
use crate::config::EngineConfig;
use crate::debug_log::{QueryDebugInfo, log_query};
use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::query::context::{CursorDirection, QueryContext};
use crate::query::dag::{QueryDAG, build_basic_query, build_or_query};
use crate::query::filter::{QueryFilter, SortDirection, SortOrder};
use crate::query::hydrate::populate_components;
use crate::query::nodes::OrBranch;
use crate::registry::{ComponentRegistry, FilterBuilderRegistry, build_json_path};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Fluent query builder. One instance per query; terminal operations
/// (`exec`, `count`, `sum`, `average`, `estimated_count`, `explain_analyze`)
/// consume the accumulated state and enforce a 30-second timeout.
pub struct Query<'a, C: GenericClient> {
    client: &'a C,
    config: EngineConfig,
    component_registry: Arc<dyn ComponentRegistry>,
    filter_registry: Arc<FilterBuilderRegistry>,
    ctx: QueryContext,
    or_branches: Option<Vec<OrBranch>>,
    populate_all: bool,
    debug: bool,
    cache: Option<Arc<PreparedStatementCache>>,
    skip_cache: bool,
    used_transaction: bool,
}

impl<'a, C: GenericClient> Query<'a, C> {
    pub fn new(
        client: &'a C,
        config: EngineConfig,
        component_registry: Arc<dyn ComponentRegistry>,
        filter_registry: Arc<FilterBuilderRegistry>,
    ) -> Self {
        Self {
            client,
            config,
            component_registry,
            filter_registry,
            ctx: QueryContext::new(),
            or_branches: None,
            populate_all: false,
            debug: false,
            cache: None,
            skip_cache: false,
            used_transaction: false,
        }
    }

    /// Consult (and populate) `cache` for this query's SQL, keyed by its
    /// structural fingerprint. Without this, every terminal operation plans
    /// from scratch.
    pub fn with_cache(&mut self, cache: Arc<PreparedStatementCache>) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    /// Bypass the prepared-statement cache for this query, or (with
    /// `component: Some(type_id)`) drop that component's cached entries
    /// before running — use when a component's schema/partition just changed.
    pub fn no_cache(&mut self, component: Option<&str>) -> &mut Self {
        self.skip_cache = true;
        if let (Some(cache), Some(type_id)) = (&self.cache, component) {
            cache.invalidate_by_component(type_id);
        }
        self
    }

    /// Marks the query as running inside a transaction, surfaced only in
    /// debug-mode log output.
    pub fn in_transaction(&mut self, used: bool) -> &mut Self {
        self.used_transaction = used;
        self
    }

    /// Restrict to a single entity by id. Fails fast on an empty string
    /// rather than letting it reach the database as a malformed filter.
    pub fn find_by_id(&mut self, id: impl Into<String>) -> QueryResult<&mut Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(QueryError::validation("entity id must not be empty"));
        }
        self.ctx.with_id = Some(id);
        Ok(self)
    }

    /// Require a component type, with an optional filter list.
    pub fn with(&mut self, type_id: impl Into<String>, filters: Vec<QueryFilter>) -> &mut Self {
        let type_id = type_id.into();
        self.ctx.component_ids.push(type_id.clone());
        if !filters.is_empty() {
            self.ctx
                .component_filters
                .entry(type_id)
                .or_default()
                .extend(filters);
        }
        self
    }

    /// `with(orQuery)`: OR-branch disjunction, wired by [`build_or_query`].
    pub fn with_or(&mut self, branches: Vec<OrBranch>) -> &mut Self {
        self.or_branches = Some(branches);
        self
    }

    pub fn without(&mut self, type_id: impl Into<String>) -> &mut Self {
        self.ctx.excluded_component_ids.push(type_id.into());
        self
    }

    pub fn exclude_entity_id(&mut self, id: impl Into<String>) -> QueryResult<&mut Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(QueryError::validation("excluded entity id must not be empty"));
        }
        self.ctx.excluded_entity_ids.push(id);
        Ok(self)
    }

    /// Fails `Validation` unless `type_id` is already in the required set.
    ///
    /// Recorded on [`QueryContext::sort_orders`] and folded into the cache
    /// key so two queries differing only in sort order don't collide, but no
    /// DAG node renders it into an `ORDER BY` clause yet — the only row
    /// ordering the generated SQL guarantees today is by entity id. See
    /// `SPEC_FULL.md` §9 ("sort_by") for the open-question resolution.
    pub fn sort_by(
        &mut self,
        type_id: impl Into<String>,
        property: impl Into<String>,
        direction: SortDirection,
        nulls_first: bool,
    ) -> QueryResult<&mut Self> {
        let type_id = type_id.into();
        if !self.ctx.component_ids.contains(&type_id) {
            return Err(QueryError::validation(format!(
                "sortBy references component '{type_id}' which is not in the required set"
            )));
        }
        self.ctx.sort_orders.push(SortOrder {
            component_name: type_id,
            property: property.into(),
            direction,
            nulls_first,
        });
        Ok(self)
    }

    pub fn take(&mut self, n: i64) -> &mut Self {
        self.ctx.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: i64) -> &mut Self {
        self.ctx.offset_value = n;
        self
    }

    /// Cursor-mode pagination zeroes any previously set offset. Fails fast on
    /// an empty string rather than letting it reach the database.
    pub fn cursor(&mut self, id: impl Into<String>, direction: CursorDirection) -> QueryResult<&mut Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(QueryError::validation("cursor id must not be empty"));
        }
        self.ctx.cursor_id = Some(id);
        self.ctx.cursor_direction = Some(direction);
        self.ctx.offset_value = 0;
        Ok(self)
    }

    pub fn populate(&mut self) -> &mut Self {
        self.populate_all = true;
        self
    }

    pub fn eager_load_components(&mut self, type_ids: Vec<String>) -> &mut Self {
        self.ctx.eager_components = type_ids;
        self
    }

    pub fn debug_mode(&mut self, enabled: bool) -> &mut Self {
        self.debug = enabled;
        self
    }

    fn build_dag(&mut self) -> QueryDAG {
        self.ctx.reset();
        let plan = match self.or_branches.take() {
            Some(branches) => build_or_query(&self.ctx, branches),
            None => build_basic_query(&self.ctx),
        };
        QueryDAG::new(plan)
    }

    fn bound_params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.ctx
            .params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    /// Renders `dag` to SQL (always — parameter values are live and must be
    /// re-bound every call), then records the structural fingerprint against
    /// the cache purely for hit/miss/eviction bookkeeping: since a given
    /// structural shape always renders identical SQL text, there is nothing
    /// further to skip, but callers still get `warm_up`/`invalidate_by_component`
    /// and accurate `get_stats()`.
    fn render_and_track(&mut self, dag: &QueryDAG, cache_key_prefix: &str) -> QueryResult<(String, bool)> {
        let sql = dag.execute(
            &mut self.ctx,
            &self.config,
            self.component_registry.as_ref(),
            &self.filter_registry,
        )?;

        let cache_hit = if self.skip_cache {
            false
        } else if let Some(cache) = &self.cache {
            let key = format!("{cache_key_prefix}{}", self.ctx.generate_cache_key());
            let sql_clone = sql.clone();
            let (_, hit) = cache.get_or_create(&key, || Ok(sql_clone))?;
            hit
        } else {
            false
        };

        if self.debug {
            log_query(&QueryDebugInfo {
                sql: &sql,
                param_count: self.ctx.params.len(),
                cache_hit,
                used_transaction: self.used_transaction,
            });
        }

        Ok((sql, cache_hit))
    }

    pub async fn exec(&mut self) -> QueryResult<Vec<Entity>> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.exec_inner()).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::QueryTimeout(QUERY_TIMEOUT)),
        }
    }

    async fn exec_inner(&mut self) -> QueryResult<Vec<Entity>> {
        let dag = self.build_dag();
        let (sql, _cache_hit) = self.render_and_track(&dag, "exec:")?;

        let params = self.bound_params();
        let rows = self.client.query(&sql, &params).await?;
        let mut entities: Vec<Entity> = rows
            .iter()
            .map(|row| Entity::new(row.get::<_, String>("id")))
            .collect();

        let eager_type_ids = if !self.ctx.eager_components.is_empty() {
            self.ctx.eager_components.clone()
        } else if self.populate_all {
            self.ctx.component_ids.clone()
        } else {
            Vec::new()
        };

        if !eager_type_ids.is_empty() {
            populate_components(
                self.client,
                self.component_registry.as_ref(),
                &self.config,
                &mut entities,
                &eager_type_ids,
            )
            .await?;
        }

        Ok(entities)
    }

    pub async fn find_one_by_id(&mut self, id: impl Into<String>) -> QueryResult<Option<Entity>> {
        self.find_by_id(id)?;
        self.take(1);
        let mut rows = self.exec().await?;
        Ok(rows.pop())
    }

    pub async fn count(&mut self) -> QueryResult<i64> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.count_inner()).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::QueryTimeout(QUERY_TIMEOUT)),
        }
    }

    async fn count_inner(&mut self) -> QueryResult<i64> {
        let dag = self.build_dag();
        let (sql, _cache_hit) = self.render_and_track(&dag, "count:")?;
        let wrapped = format!("SELECT COUNT(*) FROM ({sql}) AS subquery");
        let params = self.bound_params();
        let row = self.client.query_one(&wrapped, &params).await?;
        Ok(row.get::<_, i64>(0))
    }

    pub async fn sum(
        &mut self,
        type_id: impl Into<String>,
        field: impl Into<String>,
    ) -> QueryResult<f64> {
        self.aggregate("SUM", type_id.into(), field.into()).await
    }

    pub async fn average(
        &mut self,
        type_id: impl Into<String>,
        field: impl Into<String>,
    ) -> QueryResult<f64> {
        self.aggregate("AVG", type_id.into(), field.into()).await
    }

    async fn aggregate(&mut self, func: &str, type_id: String, field: String) -> QueryResult<f64> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.aggregate_inner(func, type_id, field)).await
        {
            Ok(result) => result,
            Err(_) => Err(QueryError::QueryTimeout(QUERY_TIMEOUT)),
        }
    }

    async fn aggregate_inner(
        &mut self,
        func: &str,
        type_id: String,
        field: String,
    ) -> QueryResult<f64> {
        let dag = self.build_dag();
        let (sql, _cache_hit) =
            self.render_and_track(&dag, &format!("{func}:{type_id}:{field}:"))?;
        let json_path = build_json_path(&field, "c");
        let type_idx = self.ctx.add_param(type_id);
        let wrapped = format!(
            "SELECT {func}(({json_path})::numeric) FROM ({sql}) AS subquery JOIN components c ON c.entity_id = subquery.id AND c.type_id = ${type_idx} AND c.deleted_at IS NULL"
        );
        let params = self.bound_params();
        let row = self.client.query_one(&wrapped, &params).await?;
        Ok(row.get::<_, Option<f64>>(0).unwrap_or(0.0))
    }

    /// Reads `reltuples` from `pg_class` for the component's partition
    /// table — O(1), falling back to an exact `count()` if the catalog has
    /// no statistics yet.
    pub async fn estimated_count(&mut self, type_id: impl Into<String>) -> QueryResult<i64> {
        let type_id = type_id.into();
        match tokio::time::timeout(QUERY_TIMEOUT, self.estimated_count_inner(type_id)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::QueryTimeout(QUERY_TIMEOUT)),
        }
    }

    async fn estimated_count_inner(&mut self, type_id: String) -> QueryResult<i64> {
        let table = self.component_registry.require_partition_table(&type_id)?;
        let row = self
            .client
            .query_opt("SELECT reltuples::bigint FROM pg_class WHERE relname = $1", &[&table])
            .await?;
        match row.and_then(|r| r.get::<_, Option<i64>>(0)) {
            Some(estimate) if estimate >= 0 => Ok(estimate),
            _ => self.count_inner().await,
        }
    }

    pub async fn explain_analyze(&mut self, buffers: bool) -> QueryResult<String> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.explain_analyze_inner(buffers)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::QueryTimeout(QUERY_TIMEOUT)),
        }
    }

    async fn explain_analyze_inner(&mut self, buffers: bool) -> QueryResult<String> {
        let dag = self.build_dag();
        let sql = dag.execute(
            &mut self.ctx,
            &self.config,
            self.component_registry.as_ref(),
            &self.filter_registry,
        )?;
        if self.debug {
            log_query(&QueryDebugInfo {
                sql: &sql,
                param_count: self.ctx.params.len(),
                cache_hit: false,
                used_transaction: self.used_transaction,
            });
        }
        let prefix = if buffers {
            "EXPLAIN (ANALYZE, BUFFERS) "
        } else {
            "EXPLAIN (ANALYZE) "
        };
        let full = format!("{prefix}{sql}");
        let params = self.bound_params();
        let rows = self.client.query(&full, &params).await?;
        let lines: Vec<String> = rows.iter().map(|row| row.get::<_, String>(0)).collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryComponentRegistry;

    fn registries() -> (Arc<dyn ComponentRegistry>, Arc<FilterBuilderRegistry>) {
        (
            Arc::new(InMemoryComponentRegistry::new()),
            Arc::new(FilterBuilderRegistry::new()),
        )
    }

    struct NullClient;
    impl GenericClient for NullClient {
        async fn query(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<Vec<tokio_postgres::Row>> {
            Ok(Vec::new())
        }
        async fn query_one(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<tokio_postgres::Row> {
            Err(QueryError::Other("no rows in NullClient".to_string()))
        }
        async fn query_opt(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<Option<tokio_postgres::Row>> {
            Ok(None)
        }
        async fn execute(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> QueryResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn find_by_id_rejects_empty_string() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        let err = query.find_by_id("").unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn sort_by_requires_component_in_required_set() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        let err = query
            .sort_by("t1", "name", SortDirection::Asc, false)
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn sort_by_succeeds_once_component_is_required() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        query.with("t1", vec![]);
        assert!(query.sort_by("t1", "name", SortDirection::Asc, false).is_ok());
    }

    #[test]
    fn cursor_zeroes_any_prior_offset() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        query.offset(50);
        query.cursor("e1", CursorDirection::After).unwrap();
        assert_eq!(query.ctx.offset_value, 0);
    }

    #[test]
    fn cursor_rejects_an_empty_id() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        assert!(query.cursor("", CursorDirection::After).is_err());
    }

    #[tokio::test]
    async fn exec_against_empty_table_returns_no_entities() {
        let (components, filters) = registries();
        let client = NullClient;
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        let entities = query.exec().await.unwrap();
        assert!(entities.is_empty());
    }

    #[tokio::test]
    async fn second_exec_of_the_same_shape_is_a_cache_hit() {
        let (components, filters) = registries();
        let client = NullClient;
        let cache = Arc::new(PreparedStatementCache::new(10));
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        query.with_cache(cache.clone());

        query.exec().await.unwrap();
        query.exec().await.unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn no_cache_skips_tracking_entirely() {
        let (components, filters) = registries();
        let client = NullClient;
        let cache = Arc::new(PreparedStatementCache::new(10));
        let mut query = Query::new(&client, EngineConfig::default(), components, filters);
        query.with_cache(cache.clone());
        query.no_cache(None);

        query.exec().await.unwrap();
        query.exec().await.unwrap();

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }
}
