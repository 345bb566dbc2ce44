//! `SourceNode`: the base `SELECT id FROM entities` fragment.

use crate::query::context::{CursorDirection, QueryContext};

#[derive(Debug, Clone, Default)]
pub struct SourceNode;

impl SourceNode {
    pub fn new() -> Self {
        Self
    }

    /// Emits:
    /// ```sql
    /// SELECT id FROM entities WHERE deleted_at IS NULL
    ///   [AND id = $withId]
    ///   [AND id NOT IN (excluded-ids...)]
    ///   [AND id {> | <} $cursorId]
    /// ORDER BY id {ASC | DESC}
    /// [LIMIT $limit] [OFFSET $offset]
    /// ```
    pub fn execute(&self, ctx: &mut QueryContext) -> String {
        let mut sql = String::from("SELECT id FROM entities WHERE deleted_at IS NULL");

        if let Some(id) = ctx.with_id.clone() {
            let idx = ctx.add_param(id);
            sql.push_str(&format!(" AND id = ${idx}"));
        }

        if !ctx.excluded_entity_ids.is_empty() {
            let ids = ctx.excluded_entity_ids.clone();
            let placeholders: Vec<String> = ids
                .into_iter()
                .map(|id| format!("${}", ctx.add_param(id)))
                .collect();
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders.join(", ")));
        }

        // Direction is DESC iff cursor_direction = before, else ASC.
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
            sql.push_str(&format!(" AND id {op} ${idx}"));
        }

        sql.push_str(&format!(" ORDER BY id {direction}"));

        // OFFSET is only emitted when cursor pagination is not in use, and
        // CTENode hasn't already materialized the page.
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_source_has_no_extra_clauses() {
        let mut ctx = QueryContext::new();
        let sql = SourceNode::new().execute(&mut ctx);
        assert_eq!(
            sql,
            "SELECT id FROM entities WHERE deleted_at IS NULL ORDER BY id ASC"
        );
        assert!(ctx.params.is_empty());
    }

    #[test]
    fn cursor_before_reverses_direction_and_drops_offset() {
        let mut ctx = QueryContext::new();
        ctx.cursor_id = Some("e1".to_string());
        ctx.cursor_direction = Some(CursorDirection::Before);
        ctx.offset_value = 5;
        let sql = SourceNode::new().execute(&mut ctx);
        assert!(sql.contains("AND id < $1"));
        assert!(sql.contains("ORDER BY id DESC"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn limit_and_zero_offset_still_emits_stable_offset_placeholder() {
        let mut ctx = QueryContext::new();
        ctx.limit = Some(10);
        let sql = SourceNode::new().execute(&mut ctx);
        assert!(sql.contains("LIMIT $1"));
        assert!(sql.contains("OFFSET $2"));
    }

    #[test]
    fn pagination_in_cte_suppresses_limit_offset_here() {
        let mut ctx = QueryContext::new();
        ctx.limit = Some(10);
        ctx.offset_value = 20;
        ctx.pagination_applied_in_cte = true;
        let sql = SourceNode::new().execute(&mut ctx);
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn params_stay_contiguous_and_ordered() {
        let mut ctx = QueryContext::new();
        ctx.with_id = Some("e0".to_string());
        ctx.excluded_entity_ids = vec!["e1".to_string(), "e2".to_string()];
        ctx.limit = Some(5);
        let sql = SourceNode::new().execute(&mut ctx);
        assert!(sql.contains("id = $1"));
        assert!(sql.contains("id NOT IN ($2, $3)"));
        assert!(sql.contains("LIMIT $4"));
        assert!(sql.contains("OFFSET $5"));
        assert_eq!(ctx.params.len(), 5);
    }
}
