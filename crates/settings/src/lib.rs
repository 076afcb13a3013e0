//! Monitoring Settings
//!
//! Thresholds and calibration for distance/posture monitoring. Updates use
//! merge-with-defaults semantics: every field is validated on its own and
//! invalid fields are ignored instead of rejecting the whole update.

mod config;
mod store;

pub use config::{Settings, SettingsPatch, MAX_WARNING_INTERVAL_SEC};
pub use store::{SettingsStore, SETTINGS_KEY};

use storage::StorageError;
use thiserror::Error;

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("Calibration failed: {0}")]
    Calibration(String),
}
