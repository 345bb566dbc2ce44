//! Convenient imports for typical `ecsql` usage.
//!
//! ```ignore
//! use ecsql::prelude::*;
//! ```

// ── Query building & execution ──────────────────────────────────────────────
pub use crate::query::{
    CursorDirection, FilterOp, OrBranch, Query, QueryContext, QueryFilter, SortDirection,
    SortOrder, or,
};

// ── Entities & components ────────────────────────────────────────────────────
pub use crate::entity::{Entity, EntityId};
pub use crate::registry::{
    ComponentConstructor, ComponentRegistry, FilterBuilderRegistry, InMemoryComponentRegistry,
    build_json_path, compose_filters, with_index_hint,
};

// ── Configuration ────────────────────────────────────────────────────────────
pub use crate::config::{EngineConfig, PartitionStrategy};

// ── Client ───────────────────────────────────────────────────────────────────
pub use crate::client::GenericClient;

// ── Caching ──────────────────────────────────────────────────────────────────
pub use crate::cache::PreparedStatementCache;

// ── Errors ───────────────────────────────────────────────────────────────────
pub use crate::error::{QueryError, QueryResult};

// ── Connection pooling (feature: pool) ──────────────────────────────────────
#[cfg(feature = "pool")]
pub use crate::client::PoolClient;

#[cfg(feature = "pool")]
pub use crate::pool::{create_pool, create_pool_with_config};
