//! `ComponentInclusionNode`: required/excluded component membership plus
//! per-component filters, either as a standalone root query or as a
//! correlated fragment ANDed onto a `CTENode`'s candidate set.
//!
//! Grounded on `condition.rs`'s parameter-threading style; the EXISTS/LATERAL
//! duality is new structure this crate needs that the teacher doesn't have,
//! built in the teacher's idiom (one `Sql`-less string builder mutating the
//! shared `QueryContext`, same as `SourceNode`/`CteNode`).

use super::filter_render::render_filter_condition;
use crate::config::EngineConfig;
use crate::error::QueryResult;
use crate::query::context::QueryContext;
use crate::query::filter::QueryFilter;
use crate::registry::FilterBuilderRegistry;

#[derive(Debug, Clone, Default)]
pub struct ComponentInclusionNode;

impl ComponentInclusionNode {
    pub fn new() -> Self {
        Self
    }

    /// `base_alias`: `None` to build a standalone root SELECT over
    /// `entity_components`; `Some(column)` to build a WHERE-fragment keyed on
    /// an outer entity-id column (e.g. a `CTENode`'s `ec.entity_id`).
    pub fn execute(
        &self,
        ctx: &mut QueryContext,
        config: &EngineConfig,
        filter_registry: &FilterBuilderRegistry,
        base_alias: Option<&str>,
    ) -> QueryResult<String> {
        match base_alias {
            None => self.execute_root(ctx, config, filter_registry),
            Some(alias) => self.execute_fragment(ctx, filter_registry, alias),
        }
    }

    fn execute_root(
        &self,
        ctx: &mut QueryContext,
        config: &EngineConfig,
        filter_registry: &FilterBuilderRegistry,
    ) -> QueryResult<String> {
        let required = ctx.component_ids.clone();

        let mut sql = if required.len() <= 1 {
            match required.first() {
                Some(type_id) => {
                    let idx = ctx.add_param(type_id.clone());
                    format!(
                        "SELECT DISTINCT ec.entity_id as id FROM entity_components ec WHERE ec.type_id = ${idx} AND ec.deleted_at IS NULL"
                    )
                }
                None => String::from(
                    "SELECT DISTINCT ec.entity_id as id FROM entity_components ec WHERE ec.deleted_at IS NULL",
                ),
            }
        } else {
            let placeholders: Vec<String> = required
                .iter()
                .cloned()
                .map(|t| format!("${}", ctx.add_param(t)))
                .collect();
            format!(
                "SELECT ec.entity_id as id FROM entity_components ec WHERE ec.type_id IN ({}) AND ec.deleted_at IS NULL GROUP BY ec.entity_id HAVING COUNT(DISTINCT ec.type_id) = {}",
                placeholders.join(", "),
                required.len()
            )
        };

        if !ctx.excluded_component_ids.is_empty() {
            let excluded = ctx.excluded_component_ids.clone();
            let placeholders: Vec<String> = excluded
                .into_iter()
                .map(|t| format!("${}", ctx.add_param(t)))
                .collect();
            sql.push_str(&format!(
                " AND ec.entity_id NOT IN (SELECT entity_id FROM entity_components WHERE type_id IN ({}) AND deleted_at IS NULL)",
                placeholders.join(", ")
            ));
        }

        // With >1 required component the base SELECT is grouped
        // (`GROUP BY ec.entity_id HAVING COUNT(...)`), so a LATERAL-joined
        // column can't be spliced onto it directly: it's neither a grouped
        // column nor wrapped in an aggregate. Force EXISTS-based rendering
        // for that shape regardless of `config.use_lateral_joins`.
        let render_config = if required.len() > 1 && config.use_lateral_joins {
            let mut forced = config.clone();
            forced.use_lateral_joins = false;
            forced
        } else {
            config.clone()
        };
        let (lateral_joins, lateral_conditions, exists_conditions) =
            self.render_filters(ctx, &render_config, filter_registry, "ec.entity_id")?;

        if !lateral_joins.is_empty() {
            sql = splice_after_where(&sql, &lateral_joins.join(" "));
        }
        if !lateral_conditions.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&lateral_conditions.join(" AND "));
        }
        if !exists_conditions.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&exists_conditions.join(" AND "));
        }

        if required.len() <= 1 {
            sql.push_str(" ORDER BY ec.entity_id");
        }

        Ok(sql)
    }

    /// Correlated-EXISTS only. LATERAL joins need to splice the outer FROM
    /// clause, which a fragment keyed off someone else's alias can't reach.
    fn execute_fragment(
        &self,
        ctx: &mut QueryContext,
        filter_registry: &FilterBuilderRegistry,
        alias: &str,
    ) -> QueryResult<String> {
        let mut conditions = Vec::new();
        let required = ctx.component_ids.clone();

        if required.len() == 1 {
            let idx = ctx.add_param(required[0].clone());
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM entity_components ec WHERE ec.entity_id = {alias} AND ec.type_id = ${idx} AND ec.deleted_at IS NULL)"
            ));
        } else if !required.is_empty() {
            let placeholders: Vec<String> = required
                .iter()
                .cloned()
                .map(|t| format!("${}", ctx.add_param(t)))
                .collect();
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM entity_components ec WHERE ec.entity_id = {alias} AND ec.type_id IN ({}) AND ec.deleted_at IS NULL GROUP BY ec.entity_id HAVING COUNT(DISTINCT ec.type_id) = {})",
                placeholders.join(", "),
                required.len()
            ));
        }

        if !ctx.excluded_component_ids.is_empty() {
            let excluded = ctx.excluded_component_ids.clone();
            let placeholders: Vec<String> = excluded
                .into_iter()
                .map(|t| format!("${}", ctx.add_param(t)))
                .collect();
            conditions.push(format!(
                "NOT EXISTS (SELECT 1 FROM entity_components ec2 WHERE ec2.entity_id = {alias} AND ec2.type_id IN ({}) AND ec2.deleted_at IS NULL)",
                placeholders.join(", ")
            ));
        }

        let filters_by_type = filters_sorted(ctx);
        for (type_id, filters) in &filters_by_type {
            for filter in filters {
                let type_idx = ctx.add_param(type_id.clone());
                let condition = render_filter_condition(filter, "c", ctx, filter_registry)?;
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM entity_components ec_f JOIN components c ON c.id = ec_f.component_id WHERE ec_f.entity_id = {alias} AND ec_f.type_id = ${type_idx} AND ec_f.deleted_at IS NULL AND c.deleted_at IS NULL AND {condition})"
                ));
            }
        }

        Ok(conditions.join(" AND "))
    }

    #[allow(clippy::type_complexity)]
    fn render_filters(
        &self,
        ctx: &mut QueryContext,
        config: &EngineConfig,
        filter_registry: &FilterBuilderRegistry,
        correlated_entity_column: &str,
    ) -> QueryResult<(Vec<String>, Vec<String>, Vec<String>)> {
        let mut lateral_joins = Vec::new();
        let mut lateral_conditions = Vec::new();
        let mut exists_conditions = Vec::new();

        let filters_by_type = filters_sorted(ctx);
        let mut position = 0usize;
        for (type_id, filters) in &filters_by_type {
            for filter in filters {
                if config.use_lateral_joins {
                    let alias = lateral_alias(type_id, &filter.field, position);
                    let type_idx = ctx.add_param(type_id.clone());
                    let condition = render_filter_condition(filter, "c", ctx, filter_registry)?;
                    lateral_joins.push(format!(
                        "CROSS JOIN LATERAL (SELECT 1 FROM entity_components ec_f JOIN components c ON c.id = ec_f.component_id WHERE ec_f.entity_id = {correlated_entity_column} AND ec_f.type_id = ${type_idx} AND ec_f.deleted_at IS NULL AND c.deleted_at IS NULL AND {condition} LIMIT 1) AS {alias}"
                    ));
                    lateral_conditions.push(format!("{alias} IS NOT NULL"));
                } else {
                    let type_idx = ctx.add_param(type_id.clone());
                    let condition = render_filter_condition(filter, "c", ctx, filter_registry)?;
                    exists_conditions.push(format!(
                        "EXISTS (SELECT 1 FROM entity_components ec_f JOIN components c ON c.id = ec_f.component_id WHERE ec_f.entity_id = {correlated_entity_column} AND ec_f.type_id = ${type_idx} AND ec_f.deleted_at IS NULL AND c.deleted_at IS NULL AND {condition})"
                    ));
                }
                position += 1;
            }
        }

        Ok((lateral_joins, lateral_conditions, exists_conditions))
    }
}

fn filters_sorted(ctx: &QueryContext) -> Vec<(String, Vec<QueryFilter>)> {
    let mut entries: Vec<(String, Vec<QueryFilter>)> = ctx
        .component_filters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Short, deterministic LATERAL alias: `lat_` + 8-char type-id prefix +
/// sanitized field + positional index, truncated to PostgreSQL's 63-char
/// identifier limit.
fn lateral_alias(type_id: &str, field: &str, position: usize) -> String {
    let prefix: String = type_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    let sanitized_field: String = field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let alias = format!("lat_{prefix}_{sanitized_field}_{position}");
    alias.chars().take(63).collect()
}

/// Inserts `extra` right after the FROM-clause table token, i.e. immediately
/// before the first ` WHERE `.
fn splice_after_where(sql: &str, extra: &str) -> String {
    match sql.find(" WHERE ") {
        Some(pos) => format!("{} {} {}", &sql[..pos], extra, &sql[pos + 1..]),
        None => format!("{sql} {extra}"),
    }
}
