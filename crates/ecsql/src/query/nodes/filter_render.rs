//! Filter-to-SQL-condition rendering, shared by `ComponentInclusionNode` and
//! `OrNode`. Grounded on `condition.rs`'s `Op<T>`/`Condition` family (one
//! render path per operator, parameters threaded through the shared context)
//! generalized to dotted JSON-path field expansion instead of typed columns.

use crate::error::{QueryError, QueryResult};
use crate::query::context::QueryContext;
use crate::query::filter::{FilterOp, QueryFilter};
use crate::registry::{FilterBuilderRegistry, build_json_path};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio_postgres::types::ToSql;

fn uuid_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
        )
        .expect("static UUID pattern is valid")
    })
}

fn is_uuid_like(value: &Value) -> bool {
    matches!(value, Value::String(s) if uuid_pattern().is_match(s))
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Render one [`QueryFilter`] into a boolean SQL condition against `alias`
/// (the components-table alias in scope), binding parameters through `ctx`.
pub fn render_filter_condition(
    filter: &QueryFilter,
    alias: &str,
    ctx: &mut QueryContext,
    filter_registry: &FilterBuilderRegistry,
) -> QueryResult<String> {
    let json_path = build_json_path(&filter.field, alias);

    if filter.op.is_custom() {
        let op_name = filter.op.as_sql();
        if let Some(options) = filter_registry.get_options(op_name) {
            if let Some(validate) = &options.validate {
                if !validate(filter) {
                    return Err(QueryError::invalid_filter(
                        ctx.param_index,
                        json_path,
                        format!("custom operator '{op_name}' rejected its filter value"),
                    ));
                }
            }
        }
        let builder = filter_registry
            .get(op_name)
            .ok_or_else(|| QueryError::UnsupportedOperator(op_name.to_string()))?;
        let (sql, _added) = builder(filter, alias, ctx)?;
        return Ok(sql);
    }

    // Testable property #7: empty-string filter values fail before the DB call.
    if let Value::String(s) = &filter.value {
        if s.is_empty() {
            return Err(QueryError::invalid_filter(
                ctx.param_index,
                json_path,
                "filter value is an empty string",
            ));
        }
    }

    match &filter.op {
        FilterOp::In | FilterOp::NotIn => {
            let values = filter.value.as_array().cloned().unwrap_or_default();
            if values.is_empty() {
                return Err(QueryError::invalid_filter(
                    ctx.param_index,
                    json_path,
                    "IN/NOT IN requires a non-empty list",
                ));
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| {
                    let bound: Arc<dyn ToSql + Sync + Send> = Arc::new(value_to_text(v));
                    format!("${}", ctx.add_param_value(bound))
                })
                .collect();
            Ok(format!(
                "{json_path} {} ({})",
                filter.op.as_sql(),
                placeholders.join(", ")
            ))
        }
        FilterOp::Like | FilterOp::Ilike | FilterOp::NotLike => {
            let text = value_to_text(&filter.value);
            let idx = ctx.add_param(text);
            Ok(format!("{json_path} {} ${idx}", filter.op.as_sql()))
        }
        FilterOp::Eq if is_uuid_like(&filter.value) => {
            let text = value_to_text(&filter.value);
            let idx = ctx.add_param(text);
            Ok(format!("{json_path} = ${idx}"))
        }
        _ if filter.value.is_number() => {
            let n = filter.value.as_f64().unwrap_or_default();
            let idx = ctx.add_param(n);
            Ok(format!(
                "({json_path})::numeric {} ${idx}::numeric",
                filter.op.as_sql()
            ))
        }
        _ => {
            let text = value_to_text(&filter.value);
            let idx = ctx.add_param(text);
            Ok(format!("{json_path} {} ${idx}", filter.op.as_sql()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_registry() -> FilterBuilderRegistry {
        FilterBuilderRegistry::new()
    }

    #[test]
    fn numeric_value_gets_numeric_cast() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("amount", FilterOp::Gte, json!(100));
        let sql = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap();
        assert_eq!(sql, "(c.data->>'amount')::numeric >= $1::numeric");
    }

    #[test]
    fn uuid_like_text_equality_has_no_cast() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new(
            "account_id",
            FilterOp::Eq,
            json!("3fa85f64-5717-4562-b3fc-2c963f66afa6"),
        );
        let sql = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap();
        assert_eq!(sql, "c.data->>'account_id' = $1");
    }

    #[test]
    fn plain_text_equality_has_no_cast() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("status", FilterOp::Eq, json!("active"));
        let sql = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap();
        assert_eq!(sql, "c.data->>'status' = $1");
    }

    #[test]
    fn dotted_field_expands_json_path() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("a.b.c", FilterOp::Eq, json!("x"));
        let sql = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap();
        assert_eq!(sql, "c.data->'a'->'b'->>'c' = $1");
    }

    #[test]
    fn empty_string_value_fails_before_binding() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("name", FilterOp::Eq, json!(""));
        let err = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterValue { .. }));
    }

    #[test]
    fn in_list_renders_placeholder_list_without_cast() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("tag", FilterOp::In, json!(["a", "b"]));
        let sql = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap();
        assert_eq!(sql, "c.data->>'tag' IN ($1, $2)");
    }

    #[test]
    fn empty_in_list_is_rejected() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("tag", FilterOp::In, json!([]));
        let err = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterValue { .. }));
    }

    #[test]
    fn unregistered_custom_operator_is_unsupported() {
        let mut ctx = QueryContext::new();
        let filter = QueryFilter::new("geo", FilterOp::Custom("~=".to_string()), json!("x"));
        let err = render_filter_condition(&filter, "c", &mut ctx, &noop_registry()).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator(_)));
    }
}
