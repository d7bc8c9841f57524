//! Motor speed, magnification and cut duration settings
//!
//! Same propose-then-confirm shape as the stage calibration, but the
//! confirmed values go straight to the hardware.

use crate::error::ControlResult;
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, CalibrationEvent};
use sbemkit_core::{HardwareFault, ValidationError};
use sbemkit_hardware::{Microscope, Microtome};
use std::fmt;
use std::time::Duration;

/// Distance (µm) the operator times each motor over
pub const SPEED_TEST_DISTANCE_UM: f64 = 1000.0;

/// XY motor speeds computed from measured travel times
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "speeds are only applied by `confirm`"]
pub struct MotorSpeedProposal {
    /// µm/s
    pub x: f64,
    /// µm/s
    pub y: f64,
}

impl MotorSpeedProposal {
    /// Speeds from the time (s) each motor took to travel 1000 µm.
    pub fn from_durations(duration_x_s: f64, duration_y_s: f64) -> Result<Self, ValidationError> {
        let dx = ValidationError::require_positive("duration_x", duration_x_s)?;
        let dy = ValidationError::require_positive("duration_y", duration_y_s)?;
        Ok(Self {
            x: SPEED_TEST_DISTANCE_UM / dx,
            y: SPEED_TEST_DISTANCE_UM / dy,
        })
    }

    /// Write the speeds to the microtome.
    pub fn confirm(self, microtome: &dyn Microtome) -> Result<(), HardwareFault> {
        microtome.set_motor_speeds(self.x, self.y).map_err(|fault| {
            tracing::warn!("Motor calibration could not be updated: {}", fault);
            fault
        })?;
        emit!(AppEvent::Calibration(CalibrationEvent::MotorSpeedsUpdated {
            x: self.x,
            y: self.y,
        }));
        Ok(())
    }
}

impl fmt::Display for MotorSpeedProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Motor speed X: {:.2}; Motor speed Y: {:.2}", self.x, self.y)
    }
}

/// Magnification calibration factor computed from one reference image
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "the factor is only applied by `confirm`"]
pub struct MagnificationProposal {
    pub factor: f64,
}

impl MagnificationProposal {
    /// `factor = magnification * frame_width * pixel_size`.
    pub fn from_measurement(
        magnification: f64,
        frame_width: u32,
        pixel_size_nm: f64,
    ) -> Result<Self, ValidationError> {
        let mag = ValidationError::require_positive("magnification", magnification)?;
        let width = ValidationError::require_positive("frame_width", f64::from(frame_width))?;
        let px = ValidationError::require_positive("pixel_size", pixel_size_nm)?;
        Ok(Self {
            factor: mag * width * px,
        })
    }

    /// Write the factor to the microscope.
    pub fn confirm(self, microscope: &dyn Microscope) -> Result<(), HardwareFault> {
        microscope.set_mag_calibration_factor(self.factor)?;
        tracing::info!("Magnification calibration factor set to {:.0}", self.factor);
        Ok(())
    }
}

/// Validate and apply a new nominal cut cycle duration.
pub fn apply_cut_duration(microtome: &dyn Microtome, seconds: f64) -> ControlResult<Duration> {
    let seconds = ValidationError::require_positive("cut_duration", seconds)?;
    let duration = Duration::from_secs_f64(seconds);
    microtome.set_full_cut_duration(duration)?;
    tracing::info!("Full cut duration set to {:.1} s", seconds);
    Ok(duration)
}
