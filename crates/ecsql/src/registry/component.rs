//! Component registry: the query engine's read-only view of registered
//! component types (name → type-id → partition table → constructor).
//!
//! The engine only consumes this interface; how component classes are
//! declared (decorators, derive macros, schema files) lives above this crate.

use crate::error::{QueryError, QueryResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Reparses a raw JSON payload into its final shape (e.g. normalizing declared
/// date properties) before it's attached to an [`crate::entity::Entity`].
pub type ComponentConstructor = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// The interface the query core requires from a component registry.
///
/// Implementations are expected to be populated once at startup and treated
/// as read-only afterward; `ensure_ready` lets a caller await that gate
/// before building a query.
pub trait ComponentRegistry: Send + Sync {
    fn component_id(&self, name: &str) -> Option<String>;
    fn constructor(&self, type_id: &str) -> Option<ComponentConstructor>;
    fn partition_table_name(&self, type_id: &str) -> Option<String>;
    /// Indexed property names whose values should be reparsed as dates during
    /// hydration, per the registered component type.
    fn date_properties(&self, type_id: &str) -> Vec<String>;

    /// Boxed rather than `impl Future` so the trait stays object-safe — the
    /// engine holds registries as `Arc<dyn ComponentRegistry>`.
    fn ensure_ready(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>>;

    /// Resolve a human name to a type-id, failing `UnregisteredComponent` if absent.
    fn require_component_id(&self, name: &str) -> QueryResult<String> {
        self.component_id(name)
            .ok_or_else(|| QueryError::unregistered_component(name))
    }

    /// Resolve a type-id to its partition table name, failing `UnregisteredComponent`.
    fn require_partition_table(&self, type_id: &str) -> QueryResult<String> {
        self.partition_table_name(type_id)
            .ok_or_else(|| QueryError::unregistered_component(type_id))
    }
}

struct ComponentMeta {
    type_id: String,
    partition_table: String,
    date_properties: Vec<String>,
    constructor: ComponentConstructor,
}

/// Derives the partition table name from a component name: lowercased,
/// non-alphanumeric runs collapsed to a single underscore, `components_` prefix.
pub fn partition_table_name_for(component_name: &str) -> String {
    let mut out = String::with_capacity(component_name.len() + 11);
    out.push_str("components_");
    let mut last_was_sep = false;
    for ch in component_name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out
}

/// Derives a deterministic type-id from a component name via UUID v5
/// (stable across process restarts, unlike a random v4 id).
pub fn type_id_for(component_name: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, component_name.as_bytes()).to_string()
}

/// A simple register-once, read-many in-memory registry. Grounded on the
/// check/schema registry pattern: a `HashMap` guarded by `RwLock`, populated
/// at startup, looked up on every query thereafter.
#[derive(Default)]
pub struct InMemoryComponentRegistry {
    by_name: RwLock<HashMap<String, ComponentMeta>>,
    by_type_id: RwLock<HashMap<String, String>>,
}

impl InMemoryComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type. The type-id and partition table are
    /// derived deterministically from `name` unless overridden.
    pub fn register(
        &self,
        name: impl Into<String>,
        date_properties: Vec<String>,
        constructor: ComponentConstructor,
    ) {
        let name = name.into();
        let type_id = type_id_for(&name);
        let partition_table = partition_table_name_for(&name);

        self.by_type_id
            .write()
            .expect("component registry lock poisoned")
            .insert(type_id.clone(), name.clone());

        self.by_name
            .write()
            .expect("component registry lock poisoned")
            .insert(
                name,
                ComponentMeta {
                    type_id,
                    partition_table,
                    date_properties,
                    constructor,
                },
            );
    }
}

impl ComponentRegistry for InMemoryComponentRegistry {
    fn component_id(&self, name: &str) -> Option<String> {
        self.by_name
            .read()
            .expect("component registry lock poisoned")
            .get(name)
            .map(|m| m.type_id.clone())
    }

    fn constructor(&self, type_id: &str) -> Option<ComponentConstructor> {
        let by_type_id = self
            .by_type_id
            .read()
            .expect("component registry lock poisoned");
        let name = by_type_id.get(type_id)?;
        self.by_name
            .read()
            .expect("component registry lock poisoned")
            .get(name)
            .map(|m| m.constructor.clone())
    }

    fn partition_table_name(&self, type_id: &str) -> Option<String> {
        let by_type_id = self
            .by_type_id
            .read()
            .expect("component registry lock poisoned");
        let name = by_type_id.get(type_id)?;
        self.by_name
            .read()
            .expect("component registry lock poisoned")
            .get(name)
            .map(|m| m.partition_table.clone())
    }

    fn date_properties(&self, type_id: &str) -> Vec<String> {
        let by_type_id = self
            .by_type_id
            .read()
            .expect("component registry lock poisoned");
        let Some(name) = by_type_id.get(type_id) else {
            return Vec::new();
        };
        self.by_name
            .read()
            .expect("component registry lock poisoned")
            .get(name)
            .map(|m| m.date_properties.clone())
            .unwrap_or_default()
    }

    fn ensure_ready(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        // Registration happens synchronously at startup; nothing to await.
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_table_name_normalizes() {
        assert_eq!(partition_table_name_for("UserProfile"), "components_userprofile");
        assert_eq!(partition_table_name_for("order-item v2"), "components_order_item_v2");
    }

    #[test]
    fn type_id_is_stable_across_calls() {
        assert_eq!(type_id_for("Position"), type_id_for("Position"));
        assert_ne!(type_id_for("Position"), type_id_for("Velocity"));
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = InMemoryComponentRegistry::new();
        registry.register("Position", vec!["updated_at".to_string()], Arc::new(|v| v));

        let type_id = registry.component_id("Position").expect("registered");
        assert_eq!(
            registry.partition_table_name(&type_id).unwrap(),
            "components_position"
        );
        assert_eq!(registry.date_properties(&type_id), vec!["updated_at"]);
        assert!(registry.constructor(&type_id).is_some());
    }

    #[test]
    fn unregistered_component_lookup_fails() {
        let registry = InMemoryComponentRegistry::new();
        let err = registry.require_component_id("Ghost").unwrap_err();
        assert!(err.is_unregistered_component());
    }
}
