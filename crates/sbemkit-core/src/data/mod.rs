//! Data models for stage positions and calibration
//!
//! This module provides:
//! - Stage positions (XY and XYZ, in micrometres)
//! - Pixel shift vectors measured between two images
//! - Stage calibration parameters (scale and rotation per axis)

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage axis identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X-axis of the stage.
    X,
    /// Y-axis of the stage.
    Y,
    /// Z-axis (cutting depth).
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Stage XY position in micrometres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct XyPosition {
    /// X position (µm)
    pub x: f64,
    /// Y position (µm)
    pub y: f64,
}

impl XyPosition {
    /// Create a new XY position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position offset by `dx`, `dy`
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for XyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3}", self.x, self.y)
    }
}

/// Full stage position in micrometres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    /// X position (µm)
    pub x: f64,
    /// Y position (µm)
    pub y: f64,
    /// Z position (µm)
    pub z: f64,
}

impl StagePosition {
    /// Create a new stage position
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "StagePosition axes must be finite: x={x}, y={y}, z={z}"
        );
        Self { x, y, z }
    }

    /// XY component of this position
    pub fn xy(&self) -> XyPosition {
        XyPosition::new(self.x, self.y)
    }

    /// Same XY with a different Z
    pub fn with_z(&self, z: f64) -> Self {
        Self { z, ..*self }
    }
}

impl fmt::Display for StagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Pixel displacement of a feature between two images
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShiftVector {
    /// Displacement along the image X axis (px)
    pub dx: f64,
    /// Displacement along the image Y axis (px)
    pub dy: f64,
}

impl ShiftVector {
    /// Create a new shift vector
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Shift from pixel position `(x1, y1)` to `(x2, y2)`
    pub fn between(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            dx: x2 - x1,
            dy: y2 - y1,
        }
    }

    /// Euclidean length in pixels
    pub fn norm(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }

    /// Component along the axis this shift was measured for
    pub fn primary(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Y => self.dy,
            _ => self.dx,
        }
    }

    /// Component across the axis this shift was measured for
    pub fn secondary(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Y => self.dx,
            _ => self.dy,
        }
    }

    /// Component-wise absolute value
    pub fn abs(&self) -> Self {
        Self {
            dx: self.dx.abs(),
            dy: self.dy.abs(),
        }
    }
}

impl fmt::Display for ShiftVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.1}, {:.1}]", self.dx, self.dy)
    }
}

/// Stage calibration parameters for one EHT setting
///
/// Scale factors relate commanded stage motion to observed image motion;
/// rotations are the angles (radians) between stage axes and image axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageCalibration {
    /// Scale factor along X (> 0)
    pub scale_x: f64,
    /// Scale factor along Y (> 0)
    pub scale_y: f64,
    /// Rotation of the X axis (radians)
    pub rotation_x: f64,
    /// Rotation of the Y axis (radians)
    pub rotation_y: f64,
}

impl Default for StageCalibration {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
        }
    }
}

impl StageCalibration {
    /// Check scale factors are positive and all values finite
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::require_positive("scale_x", self.scale_x)?;
        ValidationError::require_positive("scale_y", self.scale_y)?;
        if !self.rotation_x.is_finite() || !self.rotation_y.is_finite() {
            return Err(ValidationError::invalid("rotation", "must be finite"));
        }
        Ok(())
    }
}

impl fmt::Display for StageCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scale factor X: {:.5}; Scale factor Y: {:.5}; Rotation X: {:.5}; Rotation Y: {:.5}",
            self.scale_x, self.scale_y, self.rotation_x, self.rotation_y
        )
    }
}
