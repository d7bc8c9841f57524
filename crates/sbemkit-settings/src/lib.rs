//! SBEMKit Settings Crate
//!
//! Configuration model, JSON/TOML persistence, and per-EHT stage
//! calibration storage.

pub mod config;
pub mod error;
pub mod manager;
pub mod store;

pub use config::{
    eht_key, AcquisitionSettings, ApproachSettings, CalibrationSettings, Config,
    MicrotomeSettings, MotorTestSettings,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
pub use manager::{config_dir, default_config_path, SettingsManager};
pub use store::{CalibrationStore, ConfigCalibrationStore, MemoryCalibrationStore};
