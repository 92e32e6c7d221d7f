use crate::ConfigStore;
use crate::error::StoreError;
use crate::storage::{as_bool, as_string, insert, lookup};
use serde_json::{Map, Value};
use std::sync::RwLock;

/// A configuration store that never touches disk.
pub struct MemoryConfigStore {
    document: RwLock<Value>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self {
            document: RwLock::new(Value::Object(Map::new())),
        }
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(key, value)` pairs. Values `true` and `false`
    /// are stored as booleans.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, StoreError> {
        let mut document = Value::Object(Map::new());
        for (key, value) in pairs {
            let value = match value {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            insert(&mut document, key, value)?;
        }
        Ok(Self {
            document: RwLock::new(document),
        })
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let document = self.document.read().map_err(|_| StoreError::Poisoned)?;
        lookup(&document, key).and_then(|v| as_string(key, v))
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        let document = self.document.read().map_err(|_| StoreError::Poisoned)?;
        lookup(&document, key).and_then(|v| as_bool(key, v))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut document = self.document.write().map_err(|_| StoreError::Poisoned)?;
        insert(&mut document, key, Value::String(value.to_string()))
    }
}
