use crate::models::UserConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the user configuration inside the data directory
pub const USER_CONFIG_FILE: &str = "QRLens Config.yaml";

/// Prefix for environment overrides, e.g. `QRLENS_SETTINGS__MAX_RETRIES=5`
pub const ENV_PREFIX: &str = "QRLENS";

/// Configuration manager for the YAML settings file.
///
/// Loading goes through the `config` crate so that environment variables can override
/// individual keys; saving writes plain YAML with `serde_yaml_ng`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir` (e.g. "QRLens Data").
    ///
    /// The directory is created if it does not exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the user configuration.
    ///
    /// A missing file is not an error: defaults are used, with environment overrides
    /// still applied on top.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::new(self.user_config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!(
            "Loaded user config from {} (max_retries={}, module_scale={})",
            self.user_config_path,
            config.settings.max_retries,
            config.settings.module_scale
        );
        Ok(config)
    }

    /// Save the user configuration file.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the user configuration file path.
    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}
