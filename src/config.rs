//! Configuration management for the schema registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (registry.toml)
//! - Environment variables (REGISTRY_*)
//!
//! ## Example config file (registry.toml):
//! ```toml
//! [store]
//! path = "./data/registry.json"
//! contracts_dir = "./contracts"
//!
//! [registry]
//! default_author = "exchange-admin"
//! allow_empty_active = true
//! auto_version = true
//!
//! [cache]
//! retain_deprecated = 1
//!
//! [contract_tests]
//! run_on_activate = true
//! strict = false
//!
//! [logging]
//! filter = "info,exchange_schemas::audit=info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the schema registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Lifecycle settings
    #[serde(default)]
    pub registry: LifecycleConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub contract_tests: ContractTestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the JSON state file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Directory of contract-test fixture files
    #[serde(default)]
    pub contracts_dir: Option<PathBuf>,
}

/// Version lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Actor recorded when none is given
    #[serde(default = "default_author")]
    pub default_author: String,

    /// Whether deactivating the only Active version is permitted
    #[serde(default = "default_true")]
    pub allow_empty_active: bool,

    /// Derive the version from the declared change type when none is given
    #[serde(default = "default_true")]
    pub auto_version: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How many superseded versions stay resolvable
    #[serde(default = "default_retain_deprecated")]
    pub retain_deprecated: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractTestConfig {
    /// Run fixtures before every activation
    #[serde(default)]
    pub run_on_activate: bool,

    /// Block activation when any fixture fails
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_store_path() -> PathBuf {
    PathBuf::from("registry.json")
}

fn default_author() -> String {
    "system".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retain_deprecated() -> usize {
    1
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            contracts_dir: None,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_author: default_author(),
            allow_empty_active: true,
            auto_version: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retain_deprecated: default_retain_deprecated(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["registry.toml", ".registry.toml", "config/registry.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("gov", "exchange", "schema-registry") {
            let xdg_config = config_dir.config_dir().join("registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REGISTRY_STORE__PATH, REGISTRY_CACHE__RETAIN_DEPRECATED, ...
        builder = builder.add_source(
            Environment::with_prefix("REGISTRY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store path, resolved against the working directory
    pub fn store_path(&self) -> PathBuf {
        resolve(&self.store.path)
    }

    pub fn contracts_dir(&self) -> Option<PathBuf> {
        self.store.contracts_dir.as_deref().map(resolve)
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert!(config.registry.allow_empty_active);
        assert_eq!(config.cache.retain_deprecated, 1);
        assert!(!config.contract_tests.strict);
        assert_eq!(config.store.path, PathBuf::from("registry.json"));
    }

    #[test]
    fn test_serialize_config() {
        let config = RegistryConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[contract_tests]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[registry]\nallow_empty_active = false\n\n[cache]\nretain_deprecated = 3\n",
        )
        .unwrap();

        let config = RegistryConfig::load_from(path.to_str()).unwrap();
        assert!(!config.registry.allow_empty_active);
        assert_eq!(config.cache.retain_deprecated, 3);
        assert_eq!(config.registry.default_author, "system");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = RegistryConfig::default();
        config.contract_tests.strict = true;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = RegistryConfig::load_from(path.to_str()).unwrap();
        assert!(loaded.contract_tests.strict);
    }
}
