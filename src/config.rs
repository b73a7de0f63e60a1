//! Configuration file handling.
//!
//! This module provides loading and saving of depscan configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depscan/config.toml`
//! - macOS: `~/Library/Application Support/depscan/config.toml`
//! - Windows: `%APPDATA%\depscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! api_url = "https://ossindex.sonatype.org/api/v3/component-report"
//! registry_url = "https://registry.npmjs.org/"
//! max_in_flight = 8
//! request_timeout_secs = 30
//! mvn_command = "mvn"
//! tree_timeout_secs = 300
//! parallel = true
//! default_format = "table"
//! log_level = "warn"
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::checker::DEFAULT_ENDPOINT;
use crate::output::OutputFormat;
use crate::registry::DEFAULT_REGISTRY_URL;
use crate::tree::DEFAULT_MVN_COMMAND;

/// Application configuration.
///
/// Batch capacity, cache TTL and the API user agent are fixed and therefore
/// not part of the file.
///
/// # Example
///
/// ```no_run
/// use depscan::Config;
///
/// let config = Config::load().unwrap();
/// println!("At most {} batches in flight", config.max_in_flight);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Component-report endpoint of the vulnerability API.
    pub api_url: String,

    /// Base URL of the npm registry.
    pub registry_url: String,

    /// Upper bound on concurrent batch requests in parallel mode.
    ///
    /// Default: 8
    pub max_in_flight: usize,

    /// Timeout for each HTTP request, in seconds.
    ///
    /// Default: 30
    pub request_timeout_secs: u64,

    /// Maven executable used to resolve dependency trees.
    pub mvn_command: String,

    /// How long dependency tree generation may run, in seconds.
    ///
    /// Default: 300
    pub tree_timeout_secs: u64,

    /// Whether batches are queried concurrently by default.
    pub parallel: bool,

    /// Valid values: "table", "json"
    pub default_format: String,

    /// Fallback log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ENDPOINT.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            max_in_flight: 8,
            request_timeout_secs: 30,
            mvn_command: DEFAULT_MVN_COMMAND.to_string(),
            tree_timeout_secs: 300,
            parallel: true,
            default_format: "table".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read,
    /// parsed or validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to the config file, creating the parent
    /// directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            bail!("max_in_flight must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.tree_timeout_secs == 0 {
            bail!("tree_timeout_secs must be greater than zero");
        }
        if self.mvn_command.trim().is_empty() {
            bail!("mvn_command must not be empty");
        }
        self.default_format
            .parse::<OutputFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tree_timeout(&self) -> Duration {
        Duration::from_secs(self.tree_timeout_secs)
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
