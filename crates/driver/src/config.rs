//! Configuration management for mounted volumes.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/volumes/config.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use protocol::UploadOrder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::files::codec::is_valid_storage_id;
use crate::files::metadata::DEFAULT_DATE_FORMAT;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("volume id must be non-empty and ASCII alphanumeric, got {0:?}")]
    InvalidStorageId(String),

    #[error("volume id {0} is used more than once")]
    DuplicateStorageId(String),

    #[error("volume {id}: path must be absolute, got {path:?}")]
    RelativePath { id: String, path: PathBuf },

    #[error("volume {0}: tree_deep must be at least 1")]
    InvalidTreeDepth(String),

    #[error("volume {id}: invalid date_format {format:?}")]
    InvalidDateFormat { id: String, format: String },

    #[error("volume {id}: invalid exclude pattern {pattern:?}: {reason}")]
    InvalidPattern {
        id: String,
        pattern: String,
        reason: String,
    },

    #[error("volume {id}: invalid url {url:?}")]
    InvalidUrl { id: String, url: String },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Mounted volumes, in mount order.
    #[serde(rename = "volume")]
    pub volumes: Vec<StorageConfig>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host filesystem.
    #[default]
    Local,
    /// In-memory tree, lost on exit.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

/// Settings of one volume. Fixed for the lifetime of its driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage id prefixing every hash of this volume.
    pub id: String,
    /// Backend kind.
    pub backend: Backend,
    /// Absolute root directory.
    pub path: PathBuf,
    /// Name shown for the root. Defaults to the root's base name.
    pub alias: String,
    /// Base URL the root is served under, empty for none.
    pub url: String,
    /// Base URL for thumbnails, empty for none.
    pub tmb_url: String,
    /// Directory opened first, absolute or relative to the root.
    pub start_path: String,
    /// Disabled operation names.
    pub disabled: Vec<String>,
    /// MIME types allowed for upload.
    pub upload_allow: Vec<String>,
    /// MIME types denied for upload.
    pub upload_deny: Vec<String>,
    /// Evaluation order of the upload lists.
    pub upload_order: UploadOrder,
    /// Sub-directory levels returned by tree requests.
    pub tree_deep: u32,
    /// chrono `strftime` template for dates older than yesterday.
    pub date_format: String,
    /// Whether files may be copied out of this volume.
    pub copy_from: bool,
    /// Whether files may be copied into this volume.
    pub copy_to: bool,
    /// Force every node unwritable.
    pub read_only: bool,
    /// Regular expressions matched against base names to hide.
    pub exclude: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            id: "l1".to_string(),
            backend: Backend::Local,
            path: PathBuf::new(),
            alias: String::new(),
            url: String::new(),
            tmb_url: String::new(),
            start_path: String::new(),
            disabled: Vec::new(),
            upload_allow: Vec::new(),
            upload_deny: Vec::new(),
            upload_order: UploadOrder::default(),
            tree_deep: 1,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            copy_from: true,
            copy_to: true,
            read_only: false,
            exclude: vec![r"^\.".to_string()],
        }
    }
}

impl StorageConfig {
    /// Local volume `id` rooted at `path`, everything else default.
    pub fn local(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// In-memory volume `id` rooted at `path`, everything else default.
    pub fn memory(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Memory,
            ..Self::local(id, path)
        }
    }

    /// Validate this volume's settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_storage_id(&self.id) {
            return Err(ConfigError::InvalidStorageId(self.id.clone()));
        }

        if !self.path.is_absolute() {
            return Err(ConfigError::RelativePath {
                id: self.id.clone(),
                path: self.path.clone(),
            });
        }

        if self.tree_deep < 1 {
            return Err(ConfigError::InvalidTreeDepth(self.id.clone()));
        }

        if self.date_format.is_empty()
            || StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::InvalidDateFormat {
                id: self.id.clone(),
                format: self.date_format.clone(),
            });
        }

        for pattern in &self.exclude {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::InvalidPattern {
                    id: self.id.clone(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for url in [&self.url, &self.tmb_url] {
            if !url.is_empty() && Url::parse(url).is_err() {
                return Err(ConfigError::InvalidUrl {
                    id: self.id.clone(),
                    url: url.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volumes")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - VOLUMES_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - VOLUMES_READ_ONLY: `1` or `true` forces every volume read-only
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("VOLUMES_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(value) = std::env::var("VOLUMES_READ_ONLY") {
            if matches!(value.to_lowercase().as_str(), "1" | "true") {
                tracing::info!("Forcing all volumes read-only from environment");
                for volume in &mut self.volumes {
                    volume.read_only = true;
                }
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        for (i, volume) in self.volumes.iter().enumerate() {
            volume.validate()?;
            if self.volumes[..i].iter().any(|v| v.id == volume.id) {
                return Err(ConfigError::DuplicateStorageId(volume.id.clone()));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
