// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Layered configuration for the fabric (C10): defaults, then an on-disk
//! TOML file, then environment variables, with CLI arguments (applied by
//! the caller after [`ConfigLoader::load`] returns) taking final
//! precedence.
//!
//! ```no_run
//! use coord_fabric_core::config::ConfigLoader;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = ConfigLoader::new().load()?;
//! println!("coordinator binds on {}", config.coordinator.bind_address);
//! # Ok(())
//! # }
//! ```

pub mod models;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde_valid::Validate;
use std::path::{Path, PathBuf};

pub use models::{Config, CoordinatorSettings, WorkerSettings};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = "coord-fabric";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "COORD_FABRIC";

/// Environment variable separator for nested configuration, e.g.
/// `COORD_FABRIC_COORDINATOR__BIND_ADDRESS`.
const ENV_SEPARATOR: &str = "__";

/// Configuration loader with builder pattern.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    custom_file: Option<PathBuf>,
    skip_default_file: bool,
    skip_env: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of the platform default config file location.
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custom_file = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn skip_default_file(mut self) -> Self {
        self.skip_default_file = true;
        self
    }

    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Load configuration from defaults, then the config file (if
    /// present), then environment variables, then validate the result.
    pub fn load(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::builder();

        let defaults = Config::default();
        let defaults_value = serde_json::to_value(&defaults)
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        builder = builder.add_source(config::Config::try_from(&defaults_value)?);

        if !self.skip_default_file {
            if let Some(config_path) = self.find_config_file() {
                tracing::debug!(path = %config_path.display(), "loading config file");
                builder = builder.add_source(
                    File::from(config_path)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        if let Some(custom_path) = &self.custom_file {
            tracing::info!(path = %custom_path.display(), "loading custom config file");
            builder = builder.add_source(
                File::from(custom_path.as_path())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        if !self.skip_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .with_list_parse_key("coordinator.required_services")
                    .with_list_parse_key("worker.declared_services")
                    .list_separator(","),
            );
        }

        let built = builder.build().context("failed to build configuration")?;
        let config: Config = built
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;

        Ok(config)
    }

    /// Search `$XDG_CONFIG_HOME/coord-fabric/config.toml` (or the
    /// platform equivalent), falling back to `./config.toml`.
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if path.exists() {
                return Some(path);
            }
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        local.exists().then_some(local)
    }

    /// Platform-specific config directory for this fabric.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
    }

    /// Full path where the default config file is expected.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}

/// Write a default config file at the standard location. Errors if one
/// already exists there.
pub fn init_config_file() -> Result<PathBuf> {
    let config_dir =
        ConfigLoader::default_config_dir().context("could not determine config directory")?;
    std::fs::create_dir_all(&config_dir).context("failed to create config directory")?;

    let config_path = config_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!("config file already exists at: {}", config_path.display());
    }

    let toml_content =
        toml::to_string_pretty(&Config::default()).context("failed to serialize default config")?;
    std::fs::write(&config_path, toml_content).context("failed to write config file")?;

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn loads_defaults_with_no_file_or_env() {
        let config = ConfigLoader::new()
            .skip_default_file()
            .skip_env()
            .load()
            .expect("defaults load");
        assert_eq!(config.coordinator.heartbeat_interval_s, 30);
    }

    #[test]
    fn loads_from_custom_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");
        std::fs::write(
            &config_path,
            r#"
[coordinator]
bind_address = "127.0.0.1:9090"
heartbeat_interval_s = 45
health_check_interval_s = 20
required_services = ["ocr"]
dht_port = 7777

[worker]
coordinator_url = "http://coordinator:9090"
declared_services = ["ocr"]
service_port = 9000
use_tunnel = true
dht_port = 7778
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(&config_path)
            .skip_env()
            .load()
            .expect("custom file loads");
        assert_eq!(config.coordinator.bind_address, "127.0.0.1:9090");
        assert_eq!(config.coordinator.heartbeat_interval_s, 45);
        assert!(config.worker.use_tunnel);
    }

    #[test]
    fn environment_variable_overrides_defaults() {
        env::set_var("COORD_FABRIC_COORDINATOR__HEARTBEAT_INTERVAL_S", "90");
        let config = ConfigLoader::new()
            .skip_default_file()
            .load()
            .expect("env override loads");
        assert_eq!(config.coordinator.heartbeat_interval_s, 90);
        env::remove_var("COORD_FABRIC_COORDINATOR__HEARTBEAT_INTERVAL_S");
    }

    #[test]
    fn env_overrides_file_which_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[coordinator]\nheartbeat_interval_s = 45\n",
        )
        .unwrap();

        env::set_var("COORD_FABRIC_COORDINATOR__HEARTBEAT_INTERVAL_S", "15");
        let config = ConfigLoader::new()
            .with_file(&config_path)
            .load()
            .expect("layered load");
        assert_eq!(config.coordinator.heartbeat_interval_s, 15);
        env::remove_var("COORD_FABRIC_COORDINATOR__HEARTBEAT_INTERVAL_S");
    }

    #[test]
    fn invalid_heartbeat_interval_fails_validation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(
            &config_path,
            "[coordinator]\nheartbeat_interval_s = 0\n",
        )
        .unwrap();

        let result = ConfigLoader::new().with_file(&config_path).skip_env().load();
        assert!(result.is_err());
    }

    #[test]
    fn default_config_dir_mentions_fabric_name() {
        let dir = ConfigLoader::default_config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().to_string_lossy().contains("coord-fabric"));
    }
}
