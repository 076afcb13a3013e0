//! Application configuration

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "VISIONDIST_CONFIG";

/// Service configuration, from `visiondist.toml` and `VISIONDIST__*`
/// environment variables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen address
    pub bind_addr: String,
    /// Directory of the JSON document store
    pub data_dir: PathBuf,
    /// Keep settings, rewards and history on disk; in memory otherwise
    pub persist: bool,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub log_json: bool,
    /// Replay detections from this JSON Lines file instead of accepting
    /// them over HTTP
    pub replay_path: Option<PathBuf>,
    pub replay_hz: f64,
    /// Notifications kept for `GET /api/v1/notifications`
    pub notification_log_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("visiondist-data"),
            persist: true,
            log_level: "info".to_string(),
            log_json: false,
            replay_path: None,
            replay_hz: 10.0,
            notification_log_capacity: 200,
        }
    }
}

impl AppConfig {
    /// Load from the optional config file, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "visiondist.toml".to_string());
        Self::from_sources(File::with_name(&path).required(false))
    }

    fn from_sources(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("VISIONDIST").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert!(config.persist);
        assert!(config.replay_path.is_none());
        assert_eq!(config.notification_log_capacity, 200);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("visiondist-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "bind_addr = \"0.0.0.0:9000\"\nlog_json = true\nreplay_hz = 2.5\n",
        )
        .unwrap();

        let config = AppConfig::from_sources(File::from(path.clone())).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert!(config.log_json);
        assert_eq!(config.replay_hz, 2.5);
        assert_eq!(config.log_level, "info");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_fine() {
        let config =
            AppConfig::from_sources(File::with_name("/nonexistent/visiondist.toml").required(false))
                .unwrap();
        assert_eq!(config.replay_hz, 10.0);
    }
}
