//! # Sync Configuration
//!
//! Configuration for the identity session, the local store, listeners and blobs.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TETHER_AUTO_ANONYMOUS=false                                        │
//! │     TETHER_DATABASE_PATH=/var/lib/tether/tether.db                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tether/tether.toml (Linux)                               │
//! │     ~/Library/Application Support/dev.tether.tether/tether.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [session]
//! auto_anonymous = true
//!
//! [store]
//! database_path = "tether.db"
//! max_connections = 5
//!
//! [listeners]
//! callback_buffer = 64
//!
//! [blobs]
//! image_directory = "images"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Session Settings
// =============================================================================

/// Identity session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Whether `authenticate()` signs in anonymously when nobody is signed in.
    #[serde(default = "default_true")]
    pub auto_anonymous: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            auto_anonymous: true,
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Local document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file for `LocalDocumentStore`. `:memory:` keeps it in RAM.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tether.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Listener Settings
// =============================================================================

/// Listener delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Capacity of a `DeliveryContext` job queue. Posting blocks when full.
    #[serde(default = "default_callback_buffer")]
    pub callback_buffer: usize,
}

fn default_callback_buffer() -> usize {
    64
}

impl Default for ListenerSettings {
    fn default() -> Self {
        ListenerSettings {
            callback_buffer: default_callback_buffer(),
        }
    }
}

// =============================================================================
// Blob Settings
// =============================================================================

/// Blob upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSettings {
    /// Directory images are uploaded into.
    #[serde(default = "default_image_directory")]
    pub image_directory: String,
}

fn default_image_directory() -> String {
    "images".to_string()
}

impl Default for BlobSettings {
    fn default() -> Self {
        BlobSettings {
            image_directory: default_image_directory(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Tether configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub listeners: ListenerSettings,

    #[serde(default)]
    pub blobs: BlobSettings,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tether.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
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
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.store.database_path.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig(
                "store.database_path must not be empty".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "store.max_connections must be greater than 0".into(),
            ));
        }

        if self.listeners.callback_buffer == 0 {
            return Err(SyncError::InvalidConfig(
                "listeners.callback_buffer must be greater than 0".into(),
            ));
        }

        let dir = self.blobs.image_directory.trim_matches('/');
        if dir.is_empty() {
            return Err(SyncError::InvalidConfig(
                "blobs.image_directory must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TETHER_AUTO_ANONYMOUS") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.session.auto_anonymous = true,
                "0" | "false" | "no" => self.session.auto_anonymous = false,
                _ => warn!(value = %value, "Unknown TETHER_AUTO_ANONYMOUS value"),
            }
        }

        if let Ok(path) = std::env::var("TETHER_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("TETHER_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.store.max_connections = n;
            }
        }

        if let Ok(buffer) = std::env::var("TETHER_CALLBACK_BUFFER") {
            if let Ok(n) = buffer.parse::<usize>() {
                self.listeners.callback_buffer = n;
            }
        }

        if let Ok(dir) = std::env::var("TETHER_IMAGE_DIRECTORY") {
            self.blobs.image_directory = dir;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tether", "tether")
            .map(|dirs| dirs.config_dir().join("tether.toml"))
    }

    /// Returns the `tether_db` pool configuration for the local store.
    pub fn db_config(&self) -> tether_db::DbConfig {
        tether_db::DbConfig::new(&self.store.database_path)
            .max_connections(self.store.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.session.auto_anonymous);
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.listeners.callback_buffer, 64);
        assert_eq!(config.blobs.image_directory, "images");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.listeners.callback_buffer = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.listeners.callback_buffer = 8;
        config.blobs.image_directory = "/".to_string();
        assert!(config.validate().is_err());

        config.blobs.image_directory = "avatars".to_string();
        config.store.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [session]
            auto_anonymous = false
            "#,
        )
        .unwrap();
        assert!(!config.session.auto_anonymous);
        assert_eq!(config.store, StoreSettings::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[blobs]"));
        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_in_memory_db_config() {
        let mut config = SyncConfig::default();
        config.store.database_path = PathBuf::from(":memory:");
        assert!(config.db_config().is_in_memory());
    }

    // `load` reads TETHER_* variables; tests that call it hold this lock.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tether-config-{}", uuid::Uuid::new_v4()))
            .join("tether.toml")
    }

    #[test]
    fn test_save_then_load_from_path() {
        let _env = env_guard();
        let path = temp_config_path();

        let mut config = SyncConfig::default();
        config.session.auto_anonymous = false;
        config.store.database_path = PathBuf::from("/var/lib/tether/kitchen.db");
        config.store.max_connections = 3;
        config.listeners.callback_buffer = 16;
        config.blobs.image_directory = "avatars".to_string();

        // Parent directory does not exist yet.
        config.save(Some(path.clone())).unwrap();
        assert!(path.exists());

        let loaded = SyncConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let _env = env_guard();
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[listeners]\ncallback_buffer = 0\n").unwrap();

        let err = SyncConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.is_config_error());

        // The fallback swallows the failure.
        assert_eq!(SyncConfig::load_or_default(Some(path.clone())), SyncConfig::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let _env = env_guard();
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[store\nmax_connections = ").unwrap();

        let err = SyncConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, SyncError::ConfigLoadFailed(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let _env = env_guard();
        let path = temp_config_path();
        assert!(!path.exists());

        let loaded = SyncConfig::load(Some(path)).unwrap();
        assert_eq!(loaded, SyncConfig::default());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let _env = env_guard();
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "[session]\nauto_anonymous = true\n\n[store]\nmax_connections = 3\n",
        )
        .unwrap();

        std::env::set_var("TETHER_AUTO_ANONYMOUS", "no");
        std::env::set_var("TETHER_MAX_CONNECTIONS", "9");
        std::env::set_var("TETHER_IMAGE_DIRECTORY", "profile-images");
        let loaded = SyncConfig::load(Some(path.clone()));
        std::env::remove_var("TETHER_AUTO_ANONYMOUS");
        std::env::remove_var("TETHER_MAX_CONNECTIONS");
        std::env::remove_var("TETHER_IMAGE_DIRECTORY");

        let loaded = loaded.unwrap();
        assert!(!loaded.session.auto_anonymous);
        assert_eq!(loaded.store.max_connections, 9);
        assert_eq!(loaded.blobs.image_directory, "profile-images");
        assert_eq!(loaded.listeners.callback_buffer, 64);

        // An override that fails validation is reported like a bad file.
        std::env::set_var("TETHER_CALLBACK_BUFFER", "0");
        let err = SyncConfig::load(Some(path.clone())).unwrap_err();
        std::env::remove_var("TETHER_CALLBACK_BUFFER");
        assert!(matches!(err, SyncError::InvalidConfig(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
