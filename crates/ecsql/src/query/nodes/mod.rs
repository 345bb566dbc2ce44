//! DAG node kinds.
//!
//! A closed, tagged-variant family rather than a trait-object hierarchy —
//! the variant set is fixed (source, CTE, component-inclusion, OR), matching
//! the teacher's preference for concrete structs over `dyn` whenever the set
//! of shapes doesn't grow at runtime. Each kind keeps its own `execute`
//! method; [`QueryDAG`](super::dag::QueryDAG) matches on [`QueryNodeKind`] to
//! walk dependencies rather than dispatching through a shared trait.

mod component_inclusion;
mod cte_node;
mod filter_render;
mod or_node;
mod source;

pub use component_inclusion::ComponentInclusionNode;
pub use cte_node::CteNode;
pub use filter_render::render_filter_condition;
pub use or_node::{
    OrBranch, OrNode, build_fallback_or, build_fallback_root, build_union_all, wrap_or_root,
};
pub use source::SourceNode;

/// Discriminant used by [`QueryNode`] and the DAG's traversal logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryNodeKind {
    Source,
    Cte,
    ComponentInclusion,
    Or,
}

/// The closed set of node shapes a query plan can be built from.
#[derive(Debug, Clone)]
pub enum QueryNode {
    Source(SourceNode),
    Cte(CteNode),
    ComponentInclusion(ComponentInclusionNode),
    Or(OrNode),
}

impl QueryNode {
    pub fn node_type(&self) -> QueryNodeKind {
        match self {
            Self::Source(_) => QueryNodeKind::Source,
            Self::Cte(_) => QueryNodeKind::Cte,
            Self::ComponentInclusion(_) => QueryNodeKind::ComponentInclusion,
            Self::Or(_) => QueryNodeKind::Or,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_matches_variant() {
        assert_eq!(QueryNode::Source(SourceNode::new()).node_type(), QueryNodeKind::Source);
        assert_eq!(
            QueryNode::ComponentInclusion(ComponentInclusionNode::new()).node_type(),
            QueryNodeKind::ComponentInclusion
        );
    }
}
