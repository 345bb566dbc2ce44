//! Query filter and sort-order value types.

use serde_json::Value;

/// Built-in comparison operators, plus an escape hatch for registered custom
/// operators (matched by string against the [`crate::registry::FilterBuilderRegistry`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Ilike,
    NotLike,
    In,
    NotIn,
    /// An operator string not in the built-in set, dispatched to the custom
    /// filter-builder registry.
    Custom(String),
}

impl FilterOp {
    pub fn as_sql(&self) -> &str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Custom(op) => op.as_str(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

/// `(field_path, operator, value)`. `field_path` is dotted (`"a.b.c"`).
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// `(component_name, property_name, direction, nulls_first)`. The referenced
/// component must be in the required set — enforced by [`crate::query::builder::Query::sort_by`].
#[derive(Debug, Clone)]
pub struct SortOrder {
    pub component_name: String,
    pub property: String,
    pub direction: SortDirection,
    pub nulls_first: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ops_render_expected_sql_tokens() {
        assert_eq!(FilterOp::Eq.as_sql(), "=");
        assert_eq!(FilterOp::NotIn.as_sql(), "NOT IN");
        assert!(!FilterOp::Eq.is_custom());
    }

    #[test]
    fn custom_op_round_trips_its_token() {
        let op = FilterOp::Custom("~=".to_string());
        assert_eq!(op.as_sql(), "~=");
        assert!(op.is_custom());
    }
}
