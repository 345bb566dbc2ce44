//! `OrNode`: disjunction over component branches.
//!
//! Two strategies, selected by the static predicate
//! [`OrNode::can_use_union_all_optimization`] per §9's guidance to keep
//! OR-branch planning as free functions sharing a WHERE-assembly helper
//! rather than folding both paths into one tangled method.

use super::filter_render::render_filter_condition;
use crate::config::EngineConfig;
use crate::error::QueryResult;
use crate::query::context::{CursorDirection, QueryContext};
use crate::query::filter::QueryFilter;
use crate::registry::{ComponentRegistry, FilterBuilderRegistry};

/// One arm of a disjunctive component query: matches iff the entity carries
/// `type_id` and, when filters are present, satisfies all of them.
#[derive(Debug, Clone)]
pub struct OrBranch {
    pub type_id: String,
    pub filters: Vec<QueryFilter>,
}

impl OrBranch {
    pub fn new(type_id: impl Into<String>, filters: Vec<QueryFilter>) -> Self {
        Self {
            type_id: type_id.into(),
            filters,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrNode {
    pub branches: Vec<OrBranch>,
}

impl OrNode {
    pub fn new(branches: Vec<OrBranch>) -> Self {
        Self { branches }
    }

    /// Direct-partition UNION is only sound with no dependency in the plan —
    /// when a `ComponentInclusionNode` sits underneath, the fallback
    /// correlated-EXISTS path is used regardless of partitioning.
    pub fn can_use_union_all_optimization(config: &EngineConfig, has_dependency: bool) -> bool {
        config.direct_partition_available() && !has_dependency
    }

    /// `base_alias`: `Some(column)` when wrapping a dependency (the OR is
    /// ANDed onto the dependency's required-components constraint); `None`
    /// to build a standalone root query.
    ///
    /// Whichever strategy produces the root's core rows (`build_union_all`'s
    /// literal-type-id/UNION shape, or `build_fallback_core`'s correlated
    /// EXISTS), the result is wrapped identically by [`wrap_or_root`] so
    /// exclusions, cursor/offset pagination and ordering are always applied
    /// at the outermost layer, after the disjunction — never inside a
    /// branch, and never skipped because the optimized path was chosen.
    pub fn execute(
        &self,
        ctx: &mut QueryContext,
        config: &EngineConfig,
        component_registry: &dyn ComponentRegistry,
        filter_registry: &FilterBuilderRegistry,
        base_alias: Option<&str>,
    ) -> QueryResult<String> {
        match base_alias {
            Some(alias) => build_fallback_or(self, ctx, filter_registry, alias),
            None => {
                let core = if Self::can_use_union_all_optimization(config, false) {
                    build_union_all(self, ctx, component_registry, filter_registry)?
                } else {
                    build_fallback_core(self, ctx, filter_registry)?
                };
                Ok(wrap_or_root(&core, ctx))
            }
        }
    }
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

fn render_branch_filters(
    branch: &OrBranch,
    alias: &str,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<Option<String>> {
    if branch.filters.is_empty() {
        return Ok(None);
    }
    let conds: Vec<String> = branch
        .filters
        .iter()
        .map(|f| render_filter_condition(f, alias, ctx, filter_registry))
        .collect::<QueryResult<_>>()?;
    Ok(Some(conds.join(" AND ")))
}

/// Optimized, direct-partition path. All branches sharing a type-id collapse
/// into one `SELECT` with an OR-of-ANDs over a literal (unparameterized)
/// type-id; otherwise each branch queries its own partition and the results
/// are combined with `UNION`.
pub fn build_union_all(
    node: &OrNode,
    ctx: &mut QueryContext,
    component_registry: &dyn ComponentRegistry,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<String> {
    let all_same_type = node
        .branches
        .windows(2)
        .all(|pair| pair[0].type_id == pair[1].type_id);

    if all_same_type {
        let type_id = &node.branches[0].type_id;
        let table = component_registry.require_partition_table(type_id)?;

        let mut branch_conds = Vec::new();
        for branch in &node.branches {
            match render_branch_filters(branch, "p", ctx, filter_registry)? {
                Some(cond) => branch_conds.push(cond),
                None => branch_conds.push("TRUE".to_string()),
            }
        }

        return Ok(format!(
            "SELECT p.entity_id as id FROM {table} p WHERE p.type_id = '{}' AND p.deleted_at IS NULL AND ({})",
            escape_literal(type_id),
            branch_conds.join(" OR ")
        ));
    }

    let mut selects = Vec::with_capacity(node.branches.len());
    for branch in &node.branches {
        let table = component_registry.require_partition_table(&branch.type_id)?;
        let idx = ctx.add_param(branch.type_id.clone());
        let mut sql =
            format!("SELECT p.entity_id as id FROM {table} p WHERE p.type_id = ${idx} AND p.deleted_at IS NULL");
        if let Some(cond) = render_branch_filters(branch, "p", ctx, filter_registry)? {
            sql.push_str(" AND ");
            sql.push_str(&cond);
        }
        selects.push(sql);
    }
    Ok(selects.join(" UNION "))
}

/// Fallback path: each branch probes `components` directly via a correlated
/// `EXISTS` restricted to the latest live row per (entity-id, type-id).
///
/// The query core can't prove the persistence layer's "one live row per
/// (entity, type)" invariant from in here, so the correlated `MAX(created_at)`
/// subquery always runs; `debug_assert!` only affirms the documented contract
/// in debug builds and never changes what ships.
fn fallback_branch_condition(
    branch: &OrBranch,
    alias: &str,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<String> {
    debug_assert!(
        !branch.type_id.is_empty(),
        "OR branch must reference a registered component type"
    );

    let type_idx = ctx.add_param(branch.type_id.clone());
    let mut condition = format!(
        "EXISTS (SELECT 1 FROM components c WHERE c.entity_id = {alias} AND c.type_id = ${type_idx} AND c.deleted_at IS NULL AND c.created_at = (SELECT MAX(c2.created_at) FROM components c2 WHERE c2.entity_id = c.entity_id AND c2.type_id = c.type_id AND c2.deleted_at IS NULL)"
    );
    if let Some(cond) = render_branch_filters(branch, "c", ctx, filter_registry)? {
        condition.push_str(" AND ");
        condition.push_str(&cond);
    }
    condition.push(')');
    Ok(condition)
}

/// Fragment form: an OR-of-EXISTS condition meant to be ANDed onto a
/// dependency's WHERE clause.
pub fn build_fallback_or(
    node: &OrNode,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
    alias: &str,
) -> QueryResult<String> {
    let mut conds = Vec::with_capacity(node.branches.len());
    for branch in &node.branches {
        conds.push(fallback_branch_condition(branch, alias, ctx, filter_registry)?);
    }
    Ok(format!("({})", conds.join(" OR ")))
}

/// The fallback OR's core rows, unwrapped: an `id` column from `entities`
/// restricted to the branch disjunction. Pagination/ordering/exclusions are
/// applied afterward by [`wrap_or_root`], not here.
fn build_fallback_core(
    node: &OrNode,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<String> {
    let or_condition = build_fallback_or(node, ctx, filter_registry, "id")?;
    Ok(format!(
        "SELECT id FROM entities WHERE deleted_at IS NULL AND {or_condition}"
    ))
}

/// Root form: the fallback OR wrapped as a full entity query, with global
/// exclusions, cursor/offset pagination and ordering applied at the
/// outermost layer, after the disjunction — never inside a branch.
pub fn build_fallback_root(
    node: &OrNode,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<String> {
    let core = build_fallback_core(node, ctx, filter_registry)?;
    Ok(wrap_or_root(&core, ctx))
}

/// Wraps any OR-strategy's core `id`-producing query as
/// `SELECT id FROM (core) AS or_results`, then applies global entity-id
/// exclusions, cursor/offset pagination and ordering — identically
/// regardless of which strategy (`build_union_all` or
/// `build_fallback_core`) produced `core_sql`, per spec §4.3.4.
pub fn wrap_or_root(core_sql: &str, ctx: &mut QueryContext) -> String {
    let mut sql = format!("SELECT id FROM ({core_sql}) AS or_results");
    let mut conditions = Vec::new();

    if !ctx.excluded_entity_ids.is_empty() {
        let ids = ctx.excluded_entity_ids.clone();
        let placeholders: Vec<String> = ids
            .into_iter()
            .map(|id| format!("${}", ctx.add_param(id)))
            .collect();
        conditions.push(format!("id NOT IN ({})", placeholders.join(", ")));
    }

    let direction = match ctx.cursor_direction {
        Some(CursorDirection::Before) => "DESC",
        _ => "ASC",
    };
    if let Some(cursor_id) = ctx.cursor_id.clone() {
        let op = match ctx.cursor_direction {
            Some(CursorDirection::Before) => "<",
            _ => ">",
        };
        let idx = ctx.add_param(cursor_id);
        conditions.push(format!("id {op} ${idx}"));
    }

    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }
    sql.push_str(&format!(" ORDER BY id {direction}"));

    if !ctx.pagination_applied_in_cte {
        if let Some(limit) = ctx.limit {
            let idx = ctx.add_param(limit);
            sql.push_str(&format!(" LIMIT ${idx}"));
        }
        if ctx.cursor_id.is_none() && (ctx.limit.is_some() || ctx.offset_value > 0) {
            let idx = ctx.add_param(ctx.offset_value);
            sql.push_str(&format!(" OFFSET ${idx}"));
        }
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::FilterOp;
    use crate::registry::InMemoryComponentRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn registries() -> (InMemoryComponentRegistry, FilterBuilderRegistry) {
        let components = InMemoryComponentRegistry::new();
        components.register("Position", vec![], Arc::new(|v| v));
        (components, FilterBuilderRegistry::new())
    }

    #[test]
    fn same_type_branches_collapse_to_or_of_ands_with_literal_type_id() {
        let (components, filters) = registries();
        let type_id = components.component_id("Position").unwrap();
        let mut ctx = QueryContext::new();
        let node = OrNode::new(vec![
            OrBranch::new(type_id.clone(), vec![QueryFilter::new("x", FilterOp::Eq, json!("a"))]),
            OrBranch::new(type_id.clone(), vec![QueryFilter::new("y", FilterOp::Eq, json!("b"))]),
        ]);
        let sql = build_union_all(&node, &mut ctx, &components, &filters).unwrap();
        assert_eq!(sql.matches("UNION").count(), 0);
        assert!(sql.contains(&format!("p.type_id = '{type_id}'")));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("p.data->>'x' = $1"));
        assert!(sql.contains("p.data->>'y' = $2"));
    }

    #[test]
    fn different_type_branches_union_per_partition() {
        let (components, filters) = registries();
        components.register("Velocity", vec![], Arc::new(|v| v));
        let pos = components.component_id("Position").unwrap();
        let vel = components.component_id("Velocity").unwrap();
        let mut ctx = QueryContext::new();
        let node = OrNode::new(vec![OrBranch::new(pos, vec![]), OrBranch::new(vel, vec![])]);
        let sql = build_union_all(&node, &mut ctx, &components, &filters).unwrap();
        assert_eq!(sql.matches(" UNION ").count(), 1);
        assert_eq!(ctx.params.len(), 2);
    }

    #[test]
    fn fallback_fragment_uses_latest_live_row_subquery() {
        let (_components, filters) = registries();
        let mut ctx = QueryContext::new();
        let node = OrNode::new(vec![OrBranch::new("t1".to_string(), vec![])]);
        let sql = build_fallback_or(&node, &mut ctx, &filters, "id").unwrap();
        assert!(sql.contains("MAX(c2.created_at)"));
        assert!(sql.contains("c.entity_id = id"));
    }

    #[test]
    fn fallback_root_applies_pagination_after_the_or() {
        let (_components, filters) = registries();
        let mut ctx = QueryContext::new();
        ctx.limit = Some(5);
        let node = OrNode::new(vec![
            OrBranch::new("t1".to_string(), vec![]),
            OrBranch::new("t2".to_string(), vec![]),
        ]);
        let sql = build_fallback_root(&node, &mut ctx, &filters).unwrap();
        let or_pos = sql.find(" OR ").unwrap();
        let limit_pos = sql.find("LIMIT").unwrap();
        assert!(or_pos < limit_pos);
    }

    #[test]
    fn union_all_unavailable_when_dependency_present() {
        let config = EngineConfig::default();
        assert!(!OrNode::can_use_union_all_optimization(&config, true));
        assert!(OrNode::can_use_union_all_optimization(&config, false));
    }

    #[test]
    fn union_all_root_is_wrapped_with_exclusions_and_pagination() {
        let (components, filters) = registries();
        components.register("Velocity", vec![], Arc::new(|v| v));
        let pos = components.component_id("Position").unwrap();
        let vel = components.component_id("Velocity").unwrap();
        let mut ctx = QueryContext::new();
        ctx.excluded_entity_ids = vec!["dead-1".to_string()];
        ctx.limit = Some(10);
        let config = EngineConfig::default();
        let node = OrNode::new(vec![OrBranch::new(pos, vec![]), OrBranch::new(vel, vec![])]);
        let sql = node
            .execute(&mut ctx, &config, &components, &filters, None)
            .unwrap();
        assert!(sql.starts_with("SELECT id FROM (SELECT"));
        assert!(sql.contains(") AS or_results WHERE id NOT IN"));
        assert!(sql.contains("ORDER BY id ASC"));
        assert!(sql.contains("LIMIT"));
    }
}
