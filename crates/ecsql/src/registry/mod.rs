//! Registries consumed by the query engine: component metadata and the
//! custom-filter extension point.

mod component;
mod filter_builder;

pub use component::{
    ComponentConstructor, ComponentRegistry, InMemoryComponentRegistry, partition_table_name_for,
    type_id_for,
};
pub use filter_builder::{
    FilterBuilder, FilterBuilderOptions, FilterBuilderRegistry, SemVer, build_json_path,
    compose_filters, with_index_hint,
};
