//! Storage Layer
//!
//! Flat key-value documents with get/set/append semantics. Two backends:
//! an in-memory map (tests, ephemeral runs) and a directory of JSON files.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {message}")]
    Io { key: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Key {0} does not hold a list")]
    NotAList(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Document store keyed by short ASCII names.
pub trait KeyValueStore: Send + Sync {
    /// Read a document, `None` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Replace a document.
    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Delete a document. Returns whether something was removed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Append to a list document, dropping the oldest entries beyond
    /// `max_len`. Returns the resulting length.
    fn append(&self, key: &str, item: Value, max_len: Option<usize>) -> Result<usize, StorageError> {
        let mut items = match self.get(key)? {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(StorageError::NotAList(key.to_string())),
            None => Vec::new(),
        };
        items.push(item);
        if let Some(max_len) = max_len {
            if items.len() > max_len {
                let excess = items.len() - max_len;
                items.drain(..excess);
            }
        }
        let len = items.len();
        self.set(key, &Value::Array(items))?;
        Ok(len)
    }
}

/// Load a typed document.
pub fn load_document<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Save a typed document.
pub fn save_document<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    document: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(document)?;
    store.set(key, &value)
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_typed_round_trip() {
        let store = MemoryStore::new();
        let doc = Doc { name: "streak".into(), count: 3 };
        save_document(&store, "doc", &doc).unwrap();

        let loaded: Option<Doc> = load_document(&store, "doc").unwrap();
        assert_eq!(loaded, Some(doc));

        let missing: Option<Doc> = load_document(&store, "other").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_append_bounded() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.append("history", json!(i), Some(3)).unwrap();
        }
        assert_eq!(store.get("history").unwrap(), Some(json!([2, 3, 4])));
    }

    #[test]
    fn test_append_to_scalar_fails() {
        let store = MemoryStore::new();
        store.set("scalar", &json!(1)).unwrap();
        assert!(matches!(
            store.append("scalar", json!(2), None),
            Err(StorageError::NotAList(_))
        ));
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key("visiondist_settings").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("").is_err());
    }
}
