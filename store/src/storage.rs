use crate::ConfigStore;
use crate::error::StoreError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const CONFIG_FILE: &str = "windsor.json";

/// Configuration persisted as a JSON document under a config directory.
///
/// The whole document is held in memory and rewritten on every set.
pub struct FileConfigStore {
    path: PathBuf,
    document: RwLock<Value>,
}

impl FileConfigStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = dir.as_ref().join(CONFIG_FILE);

        let document = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            tracing::debug!("No configuration at {:?}, starting empty", path);
            Value::Object(Map::new())
        };

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Value) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&self.path, content)?;
        tracing::debug!("Wrote configuration to {:?}", self.path);
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
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
        insert(&mut document, key, Value::String(value.to_string()))?;
        self.persist(&document)
    }
}

fn segments(key: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(parts)
}

pub(crate) fn lookup<'a>(root: &'a Value, key: &str) -> Result<Option<&'a Value>, StoreError> {
    let mut current = root;
    for segment in segments(key)? {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

pub(crate) fn insert(root: &mut Value, key: &str, value: Value) -> Result<(), StoreError> {
    let parts = segments(key)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;

    let mut current = root;
    for segment in parents {
        let map = current
            .as_object_mut()
            .ok_or_else(|| StoreError::NotAnObject {
                key: key.to_string(),
                segment: segment.to_string(),
            })?;
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = current
        .as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject {
            key: key.to_string(),
            segment: last.to_string(),
        })?;
    map.insert(last.to_string(), value);
    Ok(())
}

pub(crate) fn as_string(key: &str, value: Option<&Value>) -> Result<Option<String>, StoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "string",
        }),
    }
}

pub(crate) fn as_bool(key: &str, value: Option<&Value>) -> Result<Option<bool>, StoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(_) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "bool",
        }),
    }
}
