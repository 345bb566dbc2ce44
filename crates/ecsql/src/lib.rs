//! # ecsql
//!
//! An entity-component-system query planner and execution engine over
//! PostgreSQL.
//!
//! Entities are rows in `entities`; components are JSON payloads in a
//! partitioned `components` table, indexed by `entity_components`. [`Query`]
//! builds a SQL plan from a set of required/excluded component types,
//! per-component filters, sort orders, and pagination, then executes it
//! against anything implementing [`GenericClient`].
//!
//! ## Features
//!
//! - **Planner over hand-written SQL**: a closed DAG of node kinds
//!   ([`query::nodes`]) decides between a flat `EXISTS`-chain and a
//!   materializing CTE based on filter count, never a query-builder DSL.
//! - **Pluggable custom operators**: [`FilterBuilderRegistry`] lets callers
//!   register comparison operators beyond the built-in set, versioned to
//!   detect conflicting plugins.
//! - **Prepared-statement caching**: [`PreparedStatementCache`] avoids
//!   re-planning structurally identical queries.

pub mod cache;
pub mod client;
pub mod config;
pub mod debug_log;
pub mod entity;
pub mod error;
pub mod prelude;
pub mod query;
pub mod registry;

pub mod transaction;

#[cfg(feature = "pool")]
pub mod pool;

pub use cache::{CacheStats, PreparedStatementCache, StatementHandle};
pub use client::GenericClient;
pub use config::{EngineConfig, PartitionStrategy};
pub use debug_log::QueryDebugInfo;
pub use entity::{Entity, EntityId};
pub use error::{QueryError, QueryResult};
pub use query::{
    ComponentInclusionNode, CteNode, CursorDirection, FilterOp, OrBranch, OrNode, Query,
    QueryContext, QueryFilter, SortDirection, SortOrder, SourceNode, or,
};
pub use registry::{
    ComponentConstructor, ComponentRegistry, FilterBuilder, FilterBuilderOptions,
    FilterBuilderRegistry, InMemoryComponentRegistry, SemVer, build_json_path, compose_filters,
    with_index_hint,
};

#[cfg(feature = "pool")]
pub use client::PoolClient;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, create_pool_with_tls};
