//! Settings manager
//!
//! Owns the active [`Config`] and the file it was loaded from, resolves the
//! platform config directory, and announces loads and saves on the event bus.

use crate::config::Config;
use crate::error::{SettingsError, SettingsResult};
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, SettingsEvent};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "sbemkit";
const CONFIG_FILE: &str = "settings.toml";

/// Platform config directory for SBEMKit, created if missing.
pub fn config_dir() -> SettingsResult<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| {
        SettingsError::ConfigDirectory("no config directory on this platform".to_string())
    })?;
    let dir = base.join(APP_DIR);
    std::fs::create_dir_all(&dir)
        .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", dir.display(), e)))?;
    Ok(dir)
}

/// Default settings file path.
pub fn default_config_path() -> SettingsResult<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Active configuration plus its backing file
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config: Config,
    path: PathBuf,
}

impl SettingsManager {
    /// Manager for `path` holding default settings; nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            config: Config::default(),
            path: path.into(),
        }
    }

    /// Load `path`, or start from defaults if it does not exist yet.
    pub fn load_or_default(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            let config = Config::load_from_file(&path)?;
            tracing::info!("Loaded settings from {}", path.display());
            emit!(AppEvent::Settings(SettingsEvent::Loaded));
            config
        } else {
            tracing::info!(
                "No settings at {}, using defaults",
                path.display()
            );
            Config::default()
        };
        Ok(Self { config, path })
    }

    /// Write the active configuration to its file.
    pub fn save(&self) -> SettingsResult<()> {
        self.config.save_to_file(&self.path)?;
        tracing::debug!("Saved settings to {}", self.path.display());
        emit!(AppEvent::Settings(SettingsEvent::Saved));
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the active configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Replace the whole configuration after validating it
    pub fn replace(&mut self, config: Config) -> SettingsResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
