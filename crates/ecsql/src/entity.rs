//! Entity identity and the hydrated result handle.

use serde_json::Value;
use std::collections::HashMap;

/// An opaque entity identifier. Owned by the persistence layer; the query core
/// only reads and filters on it.
pub type EntityId = String;

/// A query result row after hydration: the entity id plus whatever components
/// were eager-loaded, keyed by type-id.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub id: EntityId,
    components: HashMap<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            components: HashMap::new(),
        }
    }

    /// Attach a hydrated component payload under its type-id.
    pub fn set_component(&mut self, type_id: impl Into<String>, payload: Value) {
        self.components.insert(type_id.into(), payload);
    }

    /// Look up a previously hydrated component by type-id.
    pub fn component(&self, type_id: &str) -> Option<&Value> {
        self.components.get(type_id)
    }

    pub fn components(&self) -> &HashMap<String, Value> {
        &self.components
    }
}
