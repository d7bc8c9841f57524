//! Settings errors
//!
//! [`SettingsError`] is what callers see. Problems with the file format
//! itself are grouped under [`ConfigError`].

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    /// A value failed validation; `key` is the dotted path.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Config directory error: {0}")]
    ConfigDirectory(String),

    #[error("Settings file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SettingsError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// The settings file could not be encoded or decoded
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Only `.json` and `.toml` are understood.
    #[error("Unsupported settings file extension '{extension}' (use .json or .toml)")]
    UnsupportedFormat { extension: String },

    #[error("Malformed JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed TOML settings: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Could not encode TOML settings: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;
