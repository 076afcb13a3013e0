//! Persisted settings document

use std::sync::Arc;

use storage::KeyValueStore;
use tracing::{info, warn};

use crate::{Settings, SettingsError};

/// Storage key of the settings document
pub const SETTINGS_KEY: &str = "visiondist_settings";

/// Loads and saves [`Settings`] through a key-value store
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load settings, falling back to defaults when the document is
    /// missing or unreadable.
    pub fn load(&self) -> Settings {
        match self.store.get(SETTINGS_KEY) {
            Ok(Some(doc)) => {
                let settings = Settings::from_document(&doc);
                info!(?settings, "loaded settings");
                settings
            }
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        storage::save_document(self.store.as_ref(), SETTINGS_KEY, settings)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storage::{MemoryStore, StorageError};

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            Err(StorageError::Io { key: key.into(), message: "disk gone".into() })
        }
        fn set(&self, key: &str, _value: &serde_json::Value) -> Result<(), StorageError> {
            Err(StorageError::Io { key: key.into(), message: "disk gone".into() })
        }
        fn remove(&self, _key: &str) -> Result<bool, StorageError> {
            Ok(false)
        }
    }

    #[test]
    fn test_round_trip() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.load(), Settings::default());

        let settings = Settings {
            ideal_distance_cm: 65.0,
            is_calibrated: true,
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_partial_document_merges_with_defaults() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(SETTINGS_KEY, &json!({"maxTiltDeg": 25})).unwrap();
        let store = SettingsStore::new(backend);
        let settings = store.load();
        assert_eq!(settings.max_tilt_deg, 25.0);
        assert_eq!(settings.ideal_distance_cm, 50.0);
    }

    #[test]
    fn test_failures() {
        let store = SettingsStore::new(Arc::new(BrokenStore));
        assert_eq!(store.load(), Settings::default());
        assert!(matches!(
            store.save(&Settings::default()),
            Err(SettingsError::Persistence(_))
        ));
    }
}
