//! Configuration for SBEMKit
//!
//! Configuration is organized into sections:
//! - Acquisition (base directory, simulation)
//! - Microtome (cut cycle, motor speeds, Z read retry)
//! - Approach, motor test and calibration defaults and limits
//! - Stage calibrations keyed by beam energy
//!
//! Files are JSON or TOML, chosen by extension.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use sbemkit_core::StageCalibration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Directory calibration frames and logs are written to
    pub base_dir: Option<PathBuf>,
    /// Drive the simulated rig instead of hardware
    pub simulation_mode: bool,
    /// Save the three calibration frames as TIFF
    pub save_calibration_frames: bool,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            base_dir: None,
            simulation_mode: true,
            save_calibration_frames: true,
        }
    }
}

/// Microtome settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrotomeSettings {
    /// Nominal full cut cycle duration (s)
    pub full_cut_duration_s: f64,
    /// X motor speed (µm/s)
    pub motor_speed_x: f64,
    /// Y motor speed (µm/s)
    pub motor_speed_y: f64,
    /// Wait before the second Z read attempt (ms)
    pub z_read_retry_ms: u64,
}

impl Default for MicrotomeSettings {
    fn default() -> Self {
        Self {
            full_cut_duration_s: 12.0,
            motor_speed_x: 40.0,
            motor_speed_y: 40.0,
            z_read_retry_ms: 2000,
        }
    }
}

impl MicrotomeSettings {
    /// Cut cycle duration as a `Duration`
    pub fn full_cut_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.full_cut_duration_s).unwrap_or_default()
    }

    /// Z read retry wait as a `Duration`
    pub fn z_read_retry(&self) -> Duration {
        Duration::from_millis(self.z_read_retry_ms)
    }
}

/// Approach cutting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachSettings {
    /// Slices offered by default
    pub default_slices: u32,
    /// Largest accepted slice count
    pub max_slices: u32,
    /// Slice thickness offered by default (nm)
    pub default_thickness_nm: f64,
    /// Time per cut cycle used for the remaining-time estimate (s)
    pub cycle_estimate_s: f64,
}

impl Default for ApproachSettings {
    fn default() -> Self {
        Self {
            default_slices: 5,
            max_slices: 100,
            default_thickness_nm: 50.0,
            cycle_estimate_s: 12.0,
        }
    }
}

/// Motor stress test settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorTestSettings {
    /// Duration offered by default (minutes)
    pub default_duration_min: u32,
    /// Longest accepted duration (minutes)
    pub max_duration_min: u32,
    /// |x| and |y| limit of the random walk (µm)
    pub xy_bound_um: f64,
    /// Upper Z limit of the random walk (µm)
    pub z_bound_um: f64,
    /// Log file name, created in the acquisition base directory
    pub log_file_name: String,
    /// Fixed RNG seed; a fresh seed is drawn when unset
    pub seed: Option<u64>,
}

impl Default for MotorTestSettings {
    fn default() -> Self {
        Self {
            default_duration_min: 10,
            max_duration_min: 9999,
            xy_bound_um: 600.0,
            z_bound_um: 600.0,
            log_file_name: "motor_test_log.txt".to_string(),
            seed: None,
        }
    }
}

/// Stage calibration run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Stage shift applied along each axis (µm)
    pub shift_distance_um: f64,
    /// Pixel size of calibration frames (nm)
    pub pixel_size_nm: f64,
    /// Dwell time of calibration frames (µs)
    pub dwell_time_us: f64,
    /// Calibration frame width (px)
    pub frame_width: u32,
    /// Calibration frame height (px)
    pub frame_height: u32,
    /// Registration search radius (px)
    pub search_radius_px: u32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            shift_distance_um: 1.6,
            pixel_size_nm: 100.0,
            dwell_time_us: 0.8,
            frame_width: 96,
            frame_height: 96,
            search_radius_px: 24,
        }
    }
}

/// Map key for a beam energy
pub fn eht_key(eht_kv: f64) -> String {
    format!("{:.2}", eht_kv)
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Acquisition settings
    pub acquisition: AcquisitionSettings,
    /// Microtome settings
    pub microtome: MicrotomeSettings,
    /// Approach defaults
    pub approach: ApproachSettings,
    /// Motor test defaults
    pub motor_test: MotorTestSettings,
    /// Calibration run defaults
    pub calibration: CalibrationSettings,
    /// Stage calibrations keyed by EHT (kV, two decimals)
    pub stage_calibration: BTreeMap<String, StageCalibration>,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat {
            extension: other.unwrap_or("").to_string(),
        }
        .into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content).map_err(ConfigError::from)?,
            Format::Toml => toml::from_str(&content).map_err(ConfigError::from)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self).map_err(ConfigError::from)?,
            Format::Toml => toml::to_string_pretty(self).map_err(ConfigError::from)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let positive = |key: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SettingsError::invalid(key, format!("must be > 0 (got {})", value)))
            }
        };

        if self.microtome.full_cut_duration_s < 0.0 {
            return Err(SettingsError::invalid(
                "microtome.full_cut_duration_s",
                "must not be negative",
            ));
        }
        positive("microtome.motor_speed_x", self.microtome.motor_speed_x)?;
        positive("microtome.motor_speed_y", self.microtome.motor_speed_y)?;

        if self.approach.max_slices == 0 {
            return Err(SettingsError::invalid("approach.max_slices", "must be > 0"));
        }
        if !(1..=self.approach.max_slices).contains(&self.approach.default_slices) {
            return Err(SettingsError::invalid(
                "approach.default_slices",
                format!("must be within 1..={}", self.approach.max_slices),
            ));
        }
        positive("approach.default_thickness_nm", self.approach.default_thickness_nm)?;

        if self.motor_test.max_duration_min == 0 {
            return Err(SettingsError::invalid("motor_test.max_duration_min", "must be > 0"));
        }
        positive("motor_test.xy_bound_um", self.motor_test.xy_bound_um)?;
        positive("motor_test.z_bound_um", self.motor_test.z_bound_um)?;

        positive("calibration.shift_distance_um", self.calibration.shift_distance_um)?;
        positive("calibration.pixel_size_nm", self.calibration.pixel_size_nm)?;
        if self.calibration.frame_width == 0 || self.calibration.frame_height == 0 {
            return Err(SettingsError::invalid(
                "calibration.frame_width",
                "frame dimensions must be > 0",
            ));
        }

        for (eht, calibration) in &self.stage_calibration {
            calibration.validate().map_err(|e| {
                SettingsError::invalid(format!("stage_calibration.{}", eht), e.to_string())
            })?;
        }
        Ok(())
    }

    /// Stage calibration stored for `eht_kv`
    pub fn stage_calibration_for(&self, eht_kv: f64) -> Option<StageCalibration> {
        self.stage_calibration.get(&eht_key(eht_kv)).copied()
    }

    /// Store the stage calibration for `eht_kv`
    pub fn set_stage_calibration(&mut self, eht_kv: f64, calibration: StageCalibration) {
        self.stage_calibration.insert(eht_key(eht_kv), calibration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.approach.default_slices, 5);
        assert_eq!(config.motor_test.default_duration_min, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::new();
        config.approach.default_slices = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.set_stage_calibration(
            1.5,
            StageCalibration {
                scale_y: -1.0,
                ..Default::default()
            },
        );
        let err = config.validate().expect_err("negative scale");
        assert!(err.to_string().contains("stage_calibration.1.50"));
    }

    #[test]
    fn test_eht_key() {
        let mut config = Config::new();
        config.set_stage_calibration(1.5, StageCalibration::default());
        assert!(config.stage_calibration_for(1.50).is_some());
        assert!(config.stage_calibration_for(2.0).is_none());
        assert_eq!(eht_key(10.0), "10.00");
    }

    #[test]
    fn test_unsupported_extension() {
        let config = Config::new();
        let err = config
            .save_to_file(Path::new("settings.yaml"))
            .expect_err("yaml not supported");
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
