//! Query construction and execution: context, filters, DAG nodes, planning,
//! hydration, and the fluent builder applications use.

pub mod builder;
pub mod context;
pub mod dag;
pub mod filter;
pub mod hydrate;
pub mod nodes;

pub use builder::Query;
pub use context::{CursorDirection, QueryContext};
pub use dag::{QueryDAG, RootPlan, build_basic_query, build_or_query};
pub use filter::{FilterOp, QueryFilter, SortDirection, SortOrder};
pub use hydrate::populate_components;
pub use nodes::{ComponentInclusionNode, CteNode, OrBranch, OrNode, QueryNode, SourceNode};

/// Convenience constructor for an OR-branch list, mirroring the fluent style
/// of `Query::with_or`.
pub fn or(branches: Vec<OrBranch>) -> Vec<OrBranch> {
    branches
}
