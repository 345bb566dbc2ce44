//! `QueryDAG`: holds the node wiring for one query and renders it to SQL.
//!
//! Per §9's guidance the DAG doesn't walk a generic node/edge graph through a
//! shared trait — the shape of a plan is one of a handful of closed
//! combinations, so [`QueryDAG::execute`] matches on [`RootPlan`] directly and
//! calls each node's own `execute`, threading the same [`QueryContext`]
//! through so parameter numbering stays contiguous across fragments.

use crate::config::EngineConfig;
use crate::error::QueryResult;
use crate::query::context::QueryContext;
use crate::query::nodes::{
    ComponentInclusionNode, CteNode, OrBranch, OrNode, SourceNode, wrap_or_root,
};
use crate::registry::{ComponentRegistry, FilterBuilderRegistry};

/// The closed set of ways a plan's root can be wired, decided by
/// [`build_basic_query`] / [`build_or_query`].
#[derive(Debug, Clone)]
pub enum RootPlan {
    /// `SourceNode`, optionally with a `ComponentInclusionNode` ANDed onto it.
    Source(SourceNode, Option<ComponentInclusionNode>),
    /// `CteNode` materializing the candidate set, with a dependent
    /// `ComponentInclusionNode` filtering it further.
    Cte(CteNode, ComponentInclusionNode),
    /// `OrNode`, optionally wrapping a `ComponentInclusionNode`'s required-set
    /// constraint (`ComponentInclusion -> OrNode`).
    Or(OrNode, Option<ComponentInclusionNode>),
}

/// Planning heuristic for non-OR queries (§4.4).
pub fn build_basic_query(ctx: &QueryContext) -> RootPlan {
    let total_filters: usize = ctx.component_filters.values().map(Vec::len).sum();
    let required_len = ctx.component_ids.len();

    if total_filters >= 2 && required_len >= 1 {
        RootPlan::Cte(
            CteNode::new(ctx.component_ids.clone()),
            ComponentInclusionNode::new(),
        )
    } else if required_len > 0 || !ctx.excluded_component_ids.is_empty() {
        RootPlan::Source(SourceNode::new(), Some(ComponentInclusionNode::new()))
    } else {
        RootPlan::Source(SourceNode::new(), None)
    }
}

/// Wiring for OR queries: `ComponentInclusion -> OrNode` when required
/// components also exist, otherwise `OrNode` alone.
pub fn build_or_query(ctx: &QueryContext, branches: Vec<OrBranch>) -> RootPlan {
    let inclusion = if ctx.component_ids.is_empty() {
        None
    } else {
        Some(ComponentInclusionNode::new())
    };
    RootPlan::Or(OrNode::new(branches), inclusion)
}

pub struct QueryDAG {
    root: RootPlan,
}

impl QueryDAG {
    pub fn new(root: RootPlan) -> Self {
        Self { root }
    }

    pub fn execute(
        &self,
        ctx: &mut QueryContext,
        config: &EngineConfig,
        component_registry: &dyn ComponentRegistry,
        filter_registry: &FilterBuilderRegistry,
    ) -> QueryResult<String> {
        match &self.root {
            RootPlan::Source(source, None) => Ok(source.execute(ctx)),

            RootPlan::Source(source, Some(inclusion)) => {
                let base_sql = source.execute(ctx);
                let condition = inclusion.execute(ctx, config, filter_registry, Some("id"))?;
                Ok(splice_before_order_by(&base_sql, &condition))
            }

            RootPlan::Cte(cte, inclusion) => {
                let cte_sql = cte.execute(ctx)?;
                let condition =
                    inclusion.execute(ctx, config, filter_registry, Some("base_entities.entity_id"))?;
                let where_clause = if condition.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {condition}")
                };
                Ok(format!(
                    "{cte_sql} SELECT base_entities.entity_id as id FROM base_entities{where_clause} ORDER BY base_entities.entity_id"
                ))
            }

            RootPlan::Or(or_node, None) => {
                or_node.execute(ctx, config, component_registry, filter_registry, None)
            }

            RootPlan::Or(or_node, Some(inclusion)) => {
                let base_sql = inclusion.execute(ctx, config, filter_registry, None)?;
                let condition =
                    or_node.execute(ctx, config, component_registry, filter_registry, Some("ec.entity_id"))?;
                let core = splice_before_order_by(&base_sql, &condition);
                Ok(wrap_or_root(&core, ctx))
            }
        }
    }
}

/// ANDs `condition` onto `sql`, inserting before a trailing `ORDER BY` when
/// present (the flat multi-required-type shape has none — append instead).
fn splice_before_order_by(sql: &str, condition: &str) -> String {
    if condition.is_empty() {
        return sql.to_string();
    }
    match sql.find(" ORDER BY") {
        Some(pos) => format!("{} AND {} {}", &sql[..pos], condition, &sql[pos + 1..]),
        None => format!("{sql} AND {condition}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::FilterOp;
    use crate::query::filter::QueryFilter;
    use crate::registry::InMemoryComponentRegistry;
    use serde_json::json;

    #[test]
    fn two_plus_filters_with_required_component_picks_cte_root() {
        let mut ctx = QueryContext::new();
        ctx.component_ids = vec!["t1".to_string()];
        ctx.component_filters.insert(
            "t1".to_string(),
            vec![
                QueryFilter::new("a", FilterOp::Eq, json!("x")),
                QueryFilter::new("b", FilterOp::Eq, json!("y")),
            ],
        );
        match build_basic_query(&ctx) {
            RootPlan::Cte(_, _) => {}
            other => panic!("expected Cte root, got {other:?}"),
        }
    }

    #[test]
    fn single_filter_picks_source_root_with_inclusion() {
        let mut ctx = QueryContext::new();
        ctx.component_ids = vec!["t1".to_string()];
        ctx.component_filters.insert(
            "t1".to_string(),
            vec![QueryFilter::new("a", FilterOp::Eq, json!("x"))],
        );
        match build_basic_query(&ctx) {
            RootPlan::Source(_, Some(_)) => {}
            other => panic!("expected Source root with inclusion, got {other:?}"),
        }
    }

    #[test]
    fn no_required_or_excluded_picks_bare_source_root() {
        let ctx = QueryContext::new();
        match build_basic_query(&ctx) {
            RootPlan::Source(_, None) => {}
            other => panic!("expected bare Source root, got {other:?}"),
        }
    }

    #[test]
    fn cte_plan_renders_with_prelude_then_outer_select() {
        let mut ctx = QueryContext::new();
        ctx.component_ids = vec!["t1".to_string(), "t2".to_string()];
        ctx.component_filters.insert(
            "t1".to_string(),
            vec![
                QueryFilter::new("a", FilterOp::Eq, json!("x")),
                QueryFilter::new("b", FilterOp::Eq, json!("y")),
            ],
        );
        let plan = build_basic_query(&ctx);
        let dag = QueryDAG::new(plan);
        let registry = InMemoryComponentRegistry::new();
        let filters = FilterBuilderRegistry::new();
        let config = EngineConfig::default();
        let sql = dag.execute(&mut ctx, &config, &registry, &filters).unwrap();
        assert!(sql.starts_with("WITH base_entities AS ("));
        assert!(sql.contains("SELECT base_entities.entity_id as id FROM base_entities"));
    }

    #[test]
    fn or_query_without_required_components_wires_or_alone() {
        let ctx = QueryContext::new();
        let plan = build_or_query(&ctx, vec![OrBranch::new("t1".to_string(), vec![])]);
        match plan {
            RootPlan::Or(_, None) => {}
            other => panic!("expected bare Or root, got {other:?}"),
        }
    }

    #[test]
    fn or_query_with_required_components_wires_inclusion_then_or() {
        let mut ctx = QueryContext::new();
        ctx.component_ids = vec!["t1".to_string()];
        let plan = build_or_query(&ctx, vec![OrBranch::new("t2".to_string(), vec![])]);
        match plan {
            RootPlan::Or(_, Some(_)) => {}
            other => panic!("expected Or wrapping inclusion, got {other:?}"),
        }
    }
}
