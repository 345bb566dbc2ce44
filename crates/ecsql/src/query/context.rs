//! The shared, mutable state threaded through DAG node execution.
//!
//! Every node appends parameters and structural flags to the same
//! `QueryContext` as it contributes its SQL fragment — this is what keeps the
//! `$1, $2, ...` placeholder order correct across a multi-node plan (Testable
//! Property #1). Grounded on `Sql`'s own placeholder bookkeeping
//! (`push_bind`/`to_sql`) generalized to survive across several node fragments
//! instead of a single builder.

use super::filter::{QueryFilter, SortOrder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    After,
    Before,
}

/// Accumulates parameters, required/excluded component sets, filters, sort
/// orders, pagination, and CTE state across a single query's DAG execution.
pub struct QueryContext {
    pub params: Vec<Arc<dyn ToSql + Sync + Send>>,
    /// Next placeholder number, 1-based.
    pub param_index: usize,
    pub component_ids: Vec<String>,
    pub excluded_component_ids: Vec<String>,
    pub component_filters: HashMap<String, Vec<QueryFilter>>,
    pub excluded_entity_ids: Vec<String>,
    pub with_id: Option<String>,
    pub limit: Option<i64>,
    pub offset_value: i64,
    pub cursor_id: Option<String>,
    pub cursor_direction: Option<CursorDirection>,
    pub sort_orders: Vec<SortOrder>,
    pub has_cte: bool,
    pub cte_name: Option<String>,
    pub eager_components: Vec<String>,
    /// Set by `CTENode` so `SourceNode` doesn't double-apply LIMIT/OFFSET.
    pub pagination_applied_in_cte: bool,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            param_index: 1,
            component_ids: Vec::new(),
            excluded_component_ids: Vec::new(),
            component_filters: HashMap::new(),
            excluded_entity_ids: Vec::new(),
            with_id: None,
            limit: None,
            offset_value: 0,
            cursor_id: None,
            cursor_direction: None,
            sort_orders: Vec::new(),
            has_cte: false,
            cte_name: None,
            eager_components: Vec::new(),
            pagination_applied_in_cte: false,
        }
    }
}

impl Clone for QueryContext {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            param_index: self.param_index,
            component_ids: self.component_ids.clone(),
            excluded_component_ids: self.excluded_component_ids.clone(),
            component_filters: self.component_filters.clone(),
            excluded_entity_ids: self.excluded_entity_ids.clone(),
            with_id: self.with_id.clone(),
            limit: self.limit,
            offset_value: self.offset_value,
            cursor_id: self.cursor_id.clone(),
            cursor_direction: self.cursor_direction,
            sort_orders: self.sort_orders.clone(),
            has_cte: self.has_cte,
            cte_name: self.cte_name.clone(),
            eager_components: self.eager_components.clone(),
            pagination_applied_in_cte: self.pagination_applied_in_cte,
        }
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bound parameter and return its 1-based placeholder position.
    pub fn add_param<T>(&mut self, value: T) -> usize
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.params.push(Arc::new(value));
        let idx = self.param_index;
        self.param_index += 1;
        idx
    }

    pub(crate) fn add_param_value(&mut self, value: Arc<dyn ToSql + Sync + Send>) -> usize {
        self.params.push(value);
        let idx = self.param_index;
        self.param_index += 1;
        idx
    }

    /// Deterministic structural fingerprint — excludes parameter *values*, only
    /// shape. Two queries differing only in bound literals share a cache key.
    pub fn generate_cache_key(&self) -> String {
        let mut required: Vec<&str> = self.component_ids.iter().map(String::as_str).collect();
        required.sort_unstable();

        let mut excluded: Vec<&str> = self
            .excluded_component_ids
            .iter()
            .map(String::as_str)
            .collect();
        excluded.sort_unstable();

        let mut type_ids: Vec<&String> = self.component_filters.keys().collect();
        type_ids.sort_unstable();

        let mut filter_keys = Vec::new();
        let mut custom_ops = Vec::new();
        for type_id in type_ids {
            for filter in &self.component_filters[type_id] {
                filter_keys.push(format!("{type_id}:{}+{}", filter.field, filter.op.as_sql()));
                if filter.op.is_custom() {
                    custom_ops.push(filter.op.as_sql());
                }
            }
        }
        custom_ops.sort_unstable();
        custom_ops.dedup();

        let sort_keys: Vec<String> = self
            .sort_orders
            .iter()
            .map(|s| {
                format!(
                    "{}.{}:{}:{}",
                    s.component_name,
                    s.property,
                    s.direction.as_sql(),
                    s.nulls_first
                )
            })
            .collect();

        format!(
            "req=[{}]|exc=[{}]|filters=[{}]|sort=[{}]|cte={}:{}|custom=[{}]",
            required.join(","),
            excluded.join(","),
            filter_keys.join(","),
            sort_keys.join(","),
            self.has_cte,
            self.cte_name.as_deref().unwrap_or(""),
            custom_ops.join(","),
        )
    }

    /// Clears per-execution state (params, placeholder counter, CTE flags) but
    /// leaves structural declarations (required/excluded sets, filters, sort
    /// orders, pagination settings) intact so the same builder can be re-run.
    pub fn reset(&mut self) {
        self.params.clear();
        self.param_index = 1;
        self.has_cte = false;
        self.cte_name = None;
        self.pagination_applied_in_cte = false;
    }
}
