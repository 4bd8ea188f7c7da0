//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Config file (`codebus.toml`, found in the search paths or set explicitly)
//! 3. Environment variables (`CODEBUS_*`)
//! 4. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `CODEBUS_` prefix with `__` as
//! separator:
//!
//! - `CODEBUS_BUS__CACHE_CAPACITY=32` → `bus.cache_capacity = 32`
//! - `CODEBUS_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use codebus::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./config/codebus.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::schema::CodebusConfig;

/// File names searched for in each search path, in order.
#[cfg(feature = "toml-config")]
const CONFIG_FILE_NAMES: &[&str] = &["codebus.toml", "config.toml"];

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CODEBUS_";

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    overrides: Vec<CodebusConfig>,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            overrides: Vec::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    ///
    /// Without any, the current directory is searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load (overrides search).
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, above every other source.
    pub fn merge(mut self, config: CodebusConfig) -> Self {
        self.overrides.push(config);
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<CodebusConfig> {
        let config: CodebusConfig = self.build_figment()?.extract()?;
        validate(&config)?;

        debug!(
            cache_capacity = config.bus.cache_capacity,
            validate_arguments = config.bus.validate_arguments,
            logging_level = config.logging.level.as_str(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CodebusConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        for config in self.overrides {
            figment = figment.merge(Serialized::defaults(config));
        }
        Ok(figment)
    }

    /// Searches for and loads the first configuration file found.
    #[cfg(feature = "toml-config")]
    fn load_config_files(&self, figment: Figment) -> Figment {
        let cwd;
        let search_paths = if self.search_paths.is_empty() {
            cwd = std::env::current_dir().map(|p| vec![p]).unwrap_or_default();
            &cwd
        } else {
            &self.search_paths
        };

        for dir in search_paths {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    info!(path = %path.display(), "Loading configuration file");
                    return figment.merge(Toml::file(path));
                }
            }
        }
        debug!("No configuration file found, using defaults");
        figment
    }

    #[cfg(not(feature = "toml-config"))]
    fn load_config_files(&self, figment: Figment) -> Figment {
        figment
    }
}

/// Merges a single config file into the figment, dispatching on file extension.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        _ => {
            let _ = figment;
            Err(ConfigError::UnsupportedFormat(ext.to_string()))
        }
    }
}

/// Rejects values the bus cannot run with.
pub fn validate(config: &CodebusConfig) -> ConfigResult<()> {
    if config.bus.io_max_threads == 0 {
        return Err(ConfigError::validation("bus.io_max_threads must be at least 1"));
    }
    if config.bus.compute_threads == Some(0) {
        return Err(ConfigError::validation(
            "bus.compute_threads must be at least 1 when set",
        ));
    }
    Ok(())
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<CodebusConfig> {
    ConfigLoader::new().load()
}

// =============================================================================
// Tests
// =============================================================================
