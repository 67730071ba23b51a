//! Configuration for s3kit
//!
//! Settings are read from `config.toml` in the user's config directory
//! (`~/.config/s3kit/config.toml` on Linux), then overridden by `S3KIT_*`
//! environment variables (`S3KIT_WORKERS=8`). Command-line flags override
//! both.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::default_workers;
use crate::store::DEFAULT_PAGE_SIZE;

/// Keys accepted by `config get` / `config set`
pub const KEYS: &[&str] = &["workers", "quiet", "page_size", "store_dir"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown configuration key: '{0}'. Available keys: workers, quiet, page_size, store_dir")]
    UnknownKey(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Worker threads per run; host parallelism when unset
    #[serde(default)]
    pub workers: Option<usize>,

    /// Suppress informational output by default
    #[serde(default)]
    pub quiet: bool,

    /// Keys per listing page of a local store
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Root of the local bucket mirror
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: None,
            quiet: false,
            page_size: default_page_size(),
            store_dir: None,
        }
    }
}

impl Settings {
    /// Get the path to the config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the system config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Message("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("s3kit").join("config.toml"))
    }

    /// Load settings, creating a default config file if none exists
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed or created.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Self::load_from(&path)
    }

    /// Load settings from `path` (if present) and the environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix("S3KIT").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Save settings to the default config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the settings cannot be written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save settings to `path`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the directory cannot be created, the settings
    /// cannot be serialized to TOML, or the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Message(format!("Failed to create config directory: {e}")))?;
        }
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;
        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;
        Ok(())
    }

    /// Effective worker count
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    /// Current value of `key` as text; unset options print as empty
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::UnknownKey` for keys outside [`KEYS`].
    pub fn get(&self, key: &str) -> Result<String, SettingsError> {
        Ok(match key {
            "workers" => self.workers.map(|w| w.to_string()).unwrap_or_default(),
            "quiet" => self.quiet.to_string(),
            "page_size" => self.page_size.to_string(),
            "store_dir" => self
                .store_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        })
    }

    /// Set `key` from text; an empty value clears optional keys
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for unknown keys or values that do not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = |reason: &str| SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        match key {
            "workers" if value.is_empty() => self.workers = None,
            "workers" => match value.parse::<usize>() {
                Ok(0) | Err(_) => return Err(invalid("expected a positive number")),
                Ok(workers) => self.workers = Some(workers),
            },
            "quiet" => {
                self.quiet = value
                    .parse()
                    .map_err(|_| invalid("use 'true' or 'false'"))?;
            }
            "page_size" => match value.parse::<usize>() {
                Ok(0) | Err(_) => return Err(invalid("expected a positive number")),
                Ok(size) => self.page_size = size,
            },
            "store_dir" if value.is_empty() => self.store_dir = None,
            "store_dir" => self.store_dir = Some(PathBuf::from(value)),
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
