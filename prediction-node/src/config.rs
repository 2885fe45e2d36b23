use serde::{Deserialize, Serialize};
use smartshield_core::CategoryCatalog;
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable prefix, e.g. `SMARTSHIELD__SERVER__LISTEN_ADDR`
pub const ENV_PREFIX: &str = "SMARTSHIELD";

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main configuration structure for the prediction node
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    /// Category whitelists, log features and derived features
    pub catalog: CategoryCatalog,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Model artifact locations; an absent path disables that mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detection_path: Option<String>,
    pub classification_path: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detection_path: Some("models/detection_model.json".to_string()),
            classification_path: Some("models/classification_model.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "prediction_node=info,smartshield_core=info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9191".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file, layered with `SMARTSHIELD__*` variables
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Load from `path` when it exists, otherwise from defaults plus environment
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        if Path::new(path).exists() {
            return Self::from_file(path);
        }

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, String> {
        self.server
            .listen_addr
            .parse()
            .map_err(|e| format!("Invalid server listen address '{}': {}", self.server.listen_addr, e))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, String> {
        self.metrics
            .listen_addr
            .parse()
            .map_err(|e| format!("Invalid metrics listen address '{}': {}", self.metrics.listen_addr, e))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr()?.port() == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.max_upload_bytes == 0 {
            return Err("Upload limit cannot be 0".to_string());
        }

        if self.models.detection_path.is_none() && self.models.classification_path.is_none() {
            return Err("At least one model path must be configured".to_string());
        }

        if self.metrics.enabled {
            self.metrics_addr()?;
        }

        self.catalog.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().unwrap().port(), 8000);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.server.listen_addr = "127.0.0.1:0".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.models.detection_path = None;
        config.models.classification_path = None;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.server.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen_addr = "127.0.0.1:9000"

[models]
classification_path = "/srv/models/cat.json"

[logging]
format = "json"

[catalog]
log_features = ["sload"]
"#,
        )
        .unwrap();

        let config = NodeConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.server.max_upload_bytes, ServerConfig::default().max_upload_bytes);
        assert_eq!(
            config.models.classification_path.as_deref(),
            Some("/srv/models/cat.json")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.catalog.log_features, vec!["sload".to_string()]);
        assert!(config.catalog.is_categorical("proto"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let path = path.to_str().unwrap();

        let mut config = NodeConfig::default();
        config.metrics.enabled = true;
        config.save_to_file(path).unwrap();

        let reloaded = NodeConfig::from_file(path).unwrap();
        assert!(reloaded.metrics.enabled);
        assert_eq!(reloaded.catalog.categorical_columns().count(), 3);
        assert!(reloaded.validate().is_ok());
    }
}
