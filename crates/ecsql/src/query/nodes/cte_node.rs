//! `CTENode`: materializes the candidate entity set ahead of per-component
//! filtering when the planner decides filter count warrants it (§4.4).
//!
//! Grounded on `cte.rs`'s `WithBuilder`: pagination belongs *inside* the CTE
//! body, placed after its own `ORDER BY`, so the outer query never re-applies
//! LIMIT/OFFSET against a larger candidate set (Testable Property #4).

use crate::error::{QueryError, QueryResult};
use crate::query::context::QueryContext;

#[derive(Debug, Clone)]
pub struct CteNode {
    pub required_type_ids: Vec<String>,
}

impl CteNode {
    pub fn new(required_type_ids: Vec<String>) -> Self {
        Self { required_type_ids }
    }

    pub fn execute(&self, ctx: &mut QueryContext) -> QueryResult<String> {
        if self.required_type_ids.is_empty() {
            return Err(QueryError::EmptyRequiredSet);
        }

        let mut sql = String::from(
            "WITH base_entities AS (SELECT DISTINCT ec.entity_id FROM entity_components ec WHERE ec.type_id IN (",
        );
        let required_placeholders: Vec<String> = self
            .required_type_ids
            .iter()
            .cloned()
            .map(|t| format!("${}", ctx.add_param(t)))
            .collect();
        sql.push_str(&required_placeholders.join(", "));
        sql.push_str(") AND ec.deleted_at IS NULL");

        if !ctx.excluded_component_ids.is_empty() {
            let excluded = ctx.excluded_component_ids.clone();
            let placeholders: Vec<String> = excluded
                .into_iter()
                .map(|t| format!("${}", ctx.add_param(t)))
                .collect();
            sql.push_str(&format!(
                " AND NOT EXISTS (SELECT 1 FROM entity_components ec2 WHERE ec2.entity_id = ec.entity_id AND ec2.type_id IN ({}) AND ec2.deleted_at IS NULL)",
                placeholders.join(", ")
            ));
        }

        if !ctx.excluded_entity_ids.is_empty() {
            let excluded = ctx.excluded_entity_ids.clone();
            let placeholders: Vec<String> = excluded
                .into_iter()
                .map(|id| format!("${}", ctx.add_param(id)))
                .collect();
            sql.push_str(&format!(
                " AND ec.entity_id NOT IN ({})",
                placeholders.join(", ")
            ));
        }

        // Pagination belongs inside the CTE body, after its own ORDER BY.
        if ctx.limit.is_some() || ctx.offset_value > 0 {
            sql.push_str(" ORDER BY ec.entity_id");
            if let Some(limit) = ctx.limit {
                let idx = ctx.add_param(limit);
                sql.push_str(&format!(" LIMIT ${idx}"));
            }
            let idx = ctx.add_param(ctx.offset_value);
            sql.push_str(&format!(" OFFSET ${idx}"));
            ctx.pagination_applied_in_cte = true;
        }

        sql.push(')');

        ctx.has_cte = true;
        ctx.cte_name = Some("base_entities".to_string());

        Ok(sql)
    }
}
