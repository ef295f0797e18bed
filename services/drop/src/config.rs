use crate::storage::StorageDirectory;
use qrcode::EcLevel;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors raised while assembling the service
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to locate the running executable: {0}")]
    Executable(#[source] std::io::Error),

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Main configuration for the drop service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// QR code rendering configuration
    #[serde(default)]
    pub qr: QrConfig,
    /// Bundled web UI configuration
    #[serde(default)]
    pub static_assets: StaticAssetsConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Prometheus exporter port, disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Upload storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage root. Defaults to `uploads/` beside the executable.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// URL prefix under which stored objects are served
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Permission bits for directories created under the root (unix only)
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// QR code rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QrConfig {
    /// Width/height of the rendered image in pixels
    #[serde(default = "default_qr_size")]
    pub size: u32,
    /// Error correction level (low, medium, quartile, high)
    #[serde(default = "default_error_correction")]
    pub error_correction: String,
}

/// Prebuilt web UI served under `/static`
#[derive(Debug, Clone, Deserialize)]
pub struct StaticAssetsConfig {
    /// Directory holding the asset tree; the UI is not mounted when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Document served for unmatched paths under `/static/`
    #[serde(default = "default_index")]
    pub index: String,
}

// Default value functions
fn default_service_name() -> String {
    "drop-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

fn default_dir_mode() -> u32 {
    0o755
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    27149
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024 // 1GB
}

fn default_qr_size() -> u32 {
    256
}

fn default_error_correction() -> String {
    "medium".to_string()
}

fn default_index() -> String {
    "index.html".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "drop-service")?
            .set_default("service.log_level", "info")?
            .set_default("api.port", 27149)?
            // Add config file if present
            .add_source(config::File::with_name("config/drop").required(false))
            .add_source(config::File::with_name("/etc/landrop/drop").required(false))
            // Override with environment variables
            // DROP__STORAGE__ROOT -> storage.root
            .add_source(
                config::Environment::with_prefix("DROP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.qr.ec_level()?;
        Ok(config)
    }

    /// Storage root to inject into the service, resolved once at startup.
    ///
    /// A relative `storage.root` is anchored to the executable's directory, never
    /// to the working directory.
    pub fn storage_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.root {
            Some(root) if root.is_absolute() => Ok(root.clone()),
            Some(root) => Ok(StorageDirectory::executable_dir()?.join(root)),
            None => StorageDirectory::executable_root(),
        }
    }

    /// Address the HTTP listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl QrConfig {
    /// Parse the configured error correction level
    pub fn ec_level(&self) -> Result<EcLevel, ConfigError> {
        match self.error_correction.to_lowercase().as_str() {
            "low" | "l" => Ok(EcLevel::L),
            "medium" | "m" => Ok(EcLevel::M),
            "quartile" | "q" => Ok(EcLevel::Q),
            "high" | "h" => Ok(EcLevel::H),
            other => Err(ConfigError::InvalidValue {
                key: "qr.error_correction".to_string(),
                message: format!("unknown level '{}'", other),
            }),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            public_prefix: default_public_prefix(),
            dir_mode: default_dir_mode(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            size: default_qr_size(),
            error_correction: default_error_correction(),
        }
    }
}

impl Default for StaticAssetsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            index: default_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.api.port, 27149);
        assert_eq!(config.storage.public_prefix, "/uploads");
        assert_eq!(config.qr.size, 256);
        assert_eq!(config.listen_addr(), "0.0.0.0:27149");
        assert!(config.static_assets.dir.is_none());
    }

    #[test]
    fn test_ec_level_parsing() {
        let mut qr = QrConfig::default();
        assert_eq!(qr.ec_level().unwrap(), EcLevel::M);

        qr.error_correction = "HIGH".to_string();
        assert_eq!(qr.ec_level().unwrap(), EcLevel::H);

        qr.error_correction = "q".to_string();
        assert_eq!(qr.ec_level().unwrap(), EcLevel::Q);

        qr.error_correction = "extreme".to_string();
        assert!(matches!(
            qr.ec_level(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_explicit_storage_root_wins() {
        let mut config = Config::default();
        let absolute = std::env::temp_dir().join("drop");
        config.storage.root = Some(absolute.clone());
        assert_eq!(config.storage_root().unwrap(), absolute);
    }

    #[test]
    fn test_relative_storage_root_anchored_to_executable() {
        let mut config = Config::default();
        config.storage.root = Some(PathBuf::from("data/drops"));

        let root = config.storage_root().unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("data/drops"));
        assert_eq!(
            root.parent().unwrap().parent().unwrap(),
            StorageDirectory::executable_dir().unwrap()
        );
    }

    #[test]
    fn test_default_storage_root_is_beside_executable() {
        let config = Config::default();
        let root = config.storage_root().unwrap();
        assert!(root.ends_with("uploads"));
    }
}
