//! Configuration management for the registry client
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (registry.toml)
//! - Environment variables (SCHEMAS_*)
//!
//! ## Example config file (registry.toml):
//! ```toml
//! [registry]
//! address = "http://localhost:8081"   # or a directory of *.avsc files
//! cache_maximum_size = 500000
//!
//! [import]
//! timeout_secs = 3600
//! check_only = false
//! ```
//!
//! Stores and the importer never read these sources themselves; they are
//! handed the resolved values.

use std::path::Path;
use std::time::Duration;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// Registry address used when none is configured
pub const DEFAULT_REGISTRY_ADDRESS: &str = "http://localhost:8081";

/// Subject cache size used when none (or an unusable one) is configured
pub const DEFAULT_CACHE_MAX_SIZE: usize = 500_000;

/// Batch import deadline used when none is configured: one hour
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 60 * 60;

/// Main configuration for the registry client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Store selection
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Batch import settings
    #[serde(default)]
    pub import: ImportConfig,
}

/// Which store to use and how to size it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `http://` or `https://` URL of a registry service (or a comma separated
    /// list of cluster members), otherwise a directory
    #[serde(default = "default_address")]
    pub address: String,

    /// Maximum number of cached subject lookups (remote store only)
    #[serde(
        default = "default_cache_size",
        deserialize_with = "lenient_cache_size"
    )]
    pub cache_maximum_size: usize,
}

/// Batch import configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Deadline for the whole import, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Only load and count schemas, never register them
    #[serde(default)]
    pub check_only: bool,
}

// Default value functions
fn default_address() -> String {
    DEFAULT_REGISTRY_ADDRESS.to_string()
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_MAX_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_IMPORT_TIMEOUT_SECS
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCacheSize {
    Number(i64),
    Text(String),
}

/// Accept positive integers given as numbers or text; anything else falls
/// back to the default.
fn lenient_cache_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawCacheSize>::deserialize(deserializer).unwrap_or(None);
    Ok(parse_cache_size(raw))
}

fn parse_cache_size(raw: Option<RawCacheSize>) -> usize {
    let parsed = match &raw {
        Some(RawCacheSize::Number(n)) => usize::try_from(*n).ok(),
        Some(RawCacheSize::Text(text)) => text.trim().parse::<usize>().ok(),
        None => None,
    };
    match parsed {
        Some(size) if size > 0 => size,
        _ => {
            info!(
                "registry.cache_maximum_size property has not been set to a positive integer. Using default value: {}",
                DEFAULT_CACHE_MAX_SIZE
            );
            DEFAULT_CACHE_MAX_SIZE
        }
    }
}

impl RegistryConfig {
    /// Configuration for `address` with the default cache size
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            cache_maximum_size: DEFAULT_CACHE_MAX_SIZE,
        }
    }

    pub fn with_cache_maximum_size(mut self, size: usize) -> Self {
        self.cache_maximum_size = size;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_ADDRESS)
    }
}

impl ImportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_IMPORT_TIMEOUT_SECS,
            check_only: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from default locations plus a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["registry.toml", ".registry.toml", "config/registry.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-registry") {
            let xdg_config = config_dir.config_dir().join("registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMAS_REGISTRY__ADDRESS, SCHEMAS_IMPORT__TIMEOUT_SECS, ...
        builder = builder.add_source(Environment::with_prefix("SCHEMAS").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
