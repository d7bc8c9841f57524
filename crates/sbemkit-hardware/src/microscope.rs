//! Microscope (beam and detector) seam

use crate::microtome::HardwareResult;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Scan settings applied before a frame is acquired
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSettings {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel size in nanometres
    pub pixel_size_nm: f64,
    /// Dwell time per pixel in microseconds
    pub dwell_time_us: f64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: 96,
            height: 96,
            pixel_size_nm: 100.0,
            dwell_time_us: 0.8,
        }
    }
}

/// Scanning electron microscope
pub trait Microscope: Send + Sync {
    /// Configured beam energy in kV. Calibrations are keyed by this value.
    fn eht_kv(&self) -> f64;

    /// Whether the high tension is on.
    fn is_eht_on(&self) -> HardwareResult<bool>;

    /// Request high tension on. The beam ramps up asynchronously.
    fn turn_eht_on(&self) -> HardwareResult<()>;

    /// Request high tension off.
    fn turn_eht_off(&self) -> HardwareResult<()>;

    /// Apply scan settings and acquire one frame.
    fn acquire_frame(&self, settings: &FrameSettings) -> HardwareResult<GrayImage>;

    /// Magnification calibration factor currently in use.
    fn mag_calibration_factor(&self) -> f64;

    /// Replace the magnification calibration factor.
    fn set_mag_calibration_factor(&self, factor: f64) -> HardwareResult<()>;
}
