//! # Sync Configuration
//!
//! Configuration management for the upload engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SENSA_COLLECTOR_URL=https://collector.example.org/api/v2           │
//! │     SENSA_DEVICE_ID=abc-123                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sensa/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/org.sensa.sensa/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device_id, default batch limits                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Pixel 7"
//!
//! [collector]
//! base_url = "https://collector.example.org/api/v2"
//! login = "alice"
//! password = "secret"
//! connect_timeout_secs = 5
//! compress = true
//!
//! [batch]
//! location_limit = 1500
//! acceleration_limit = 2000
//! rotation_limit = 2000
//! direction_limit = 2000
//!
//! [storage]
//! database_path = "/var/lib/sensa/sensa.db"
//! purge_synced_sensor_data = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use sensa_core::batch::{BatchLimits, DEFAULT_LOCATION_LIMIT, DEFAULT_SENSOR_LIMIT};
use sensa_core::PerKind;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this device towards the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    #[serde(default = "generate_device_id")]
    pub id: String,

    /// Human-readable device name, sent on registration.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Sensa Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: generate_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Collector Settings
// =============================================================================

/// Where and how to upload.
#[derive(Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Base URL of the collector API. Endpoints are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account login.
    #[serde(default)]
    pub login: String,

    /// Account password.
    #[serde(default)]
    pub password: String,

    /// TCP connect timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Gzip request bodies.
    #[serde(default = "default_true")]
    pub compress: bool,
}

// Keeps the password out of logs.
impl std::fmt::Debug for CollectorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorSettings")
            .field("base_url", &self.base_url)
            .field("login", &self.login)
            .field("password", &"***")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("compress", &self.compress)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/v2".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for CollectorSettings {
    fn default() -> Self {
        CollectorSettings {
            base_url: default_base_url(),
            login: String::new(),
            password: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            compress: true,
        }
    }
}

impl CollectorSettings {
    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Batch Settings
// =============================================================================

/// Per-kind maximum points per upload request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_location_limit")]
    pub location_limit: u64,
    #[serde(default = "default_sensor_limit")]
    pub acceleration_limit: u64,
    #[serde(default = "default_sensor_limit")]
    pub rotation_limit: u64,
    #[serde(default = "default_sensor_limit")]
    pub direction_limit: u64,
}

fn default_location_limit() -> u64 {
    DEFAULT_LOCATION_LIMIT
}

fn default_sensor_limit() -> u64 {
    DEFAULT_SENSOR_LIMIT
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            location_limit: DEFAULT_LOCATION_LIMIT,
            acceleration_limit: DEFAULT_SENSOR_LIMIT,
            rotation_limit: DEFAULT_SENSOR_LIMIT,
            direction_limit: DEFAULT_SENSOR_LIMIT,
        }
    }
}

impl BatchSettings {
    /// Limits in planner form.
    pub fn limits(&self) -> BatchLimits {
        BatchLimits(PerKind::new([
            self.location_limit,
            self.acceleration_limit,
            self.rotation_limit,
            self.direction_limit,
        ]))
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local point store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Delete inertial points once their measurement is fully synced.
    /// Locations are always kept.
    #[serde(default)]
    pub purge_synced_sensor_data: bool,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("org", "sensa", "sensa")
        .map(|dirs| dirs.data_dir().join("sensa.db"))
        .unwrap_or_else(|| PathBuf::from("sensa.db"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
            purge_synced_sensor_data: false,
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete uploader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Collector endpoint and credentials.
    #[serde(default)]
    pub collector: CollectorSettings,

    /// Batch sizing.
    #[serde(default)]
    pub batch: BatchSettings,

    /// Local storage.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        self.collector_url()?;

        self.batch
            .limits()
            .validate()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        if self.collector.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Parses the collector base URL, accepting only http and https.
    pub fn collector_url(&self) -> SyncResult<Url> {
        parse_http_url(&self.collector.base_url)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("SENSA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("SENSA_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(url) = std::env::var("SENSA_COLLECTOR_URL") {
            debug!(url = %url, "Overriding collector URL from environment");
            self.collector.base_url = url;
        }

        if let Ok(login) = std::env::var("SENSA_LOGIN") {
            self.collector.login = login;
        }

        if let Ok(password) = std::env::var("SENSA_PASSWORD") {
            self.collector.password = password;
        }

        if let Ok(compress) = std::env::var("SENSA_COMPRESS") {
            match compress.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.collector.compress = true,
                "0" | "false" | "no" | "off" => self.collector.compress = false,
                _ => warn!(value = %compress, "Unknown SENSA_COMPRESS value in environment"),
            }
        }

        if let Ok(path) = std::env::var("SENSA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = PathBuf::from(path);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "sensa", "sensa")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}

/// Parses `raw` as an absolute http(s) URL.
pub(crate) fn parse_http_url(raw: &str) -> SyncResult<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SyncError::MalformedUrl(format!(
            "Collector URL must use http or https, got: {other}://"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.batch.location_limit, 1500);
        assert_eq!(config.batch.rotation_limit, 2000);
        assert_eq!(config.collector.connect_timeout(), Duration::from_secs(5));
        assert!(config.collector.compress);
        assert!(!config.storage.purge_synced_sensor_data);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.device.id = String::new();
        assert_eq!(config.validate(), Err(SyncError::MissingDeviceId));

        config.device.id = "test".to_string();
        config.collector.base_url = "ftp://collector".to_string();
        assert_eq!(config.validate().unwrap_err().code(), ErrorCode::MalformedUrl);

        config.collector.base_url = "::not a url::".to_string();
        assert_eq!(config.validate().unwrap_err().code(), ErrorCode::MalformedUrl);

        config.collector.base_url = "https://collector.example.org/api/v2".to_string();
        assert!(config.validate().is_ok());

        config.batch.acceleration_limit = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [collector]
            base_url = "https://c.example.org"
            login = "alice"

            [batch]
            location_limit = 10
            "#,
        )
        .unwrap();

        assert!(!config.device.id.is_empty());
        assert_eq!(config.collector.login, "alice");
        assert_eq!(config.collector.connect_timeout_secs, 5);
        assert_eq!(config.batch.location_limit, 10);
        assert_eq!(config.batch.direction_limit, 2000);
        assert_eq!(config.batch.limits().0.into_inner(), [10, 2000, 2000, 2000]);
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[collector]"));
        assert!(toml_str.contains("[batch]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("sensa-config-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.device.name = "Test Phone".to_string();
        config.collector.base_url = "https://collector.example.org".to_string();
        config.save(Some(path.clone())).unwrap();

        let loaded: SyncConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.device.name, "Test Phone");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config = SyncConfig::default();
        config.collector.password = "hunter2".to_string();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
