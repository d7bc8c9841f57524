//! Error handling for SBEMKit
//!
//! Provides error types for all layers of the application:
//! - Hardware faults (microtome, stage and beam drivers)
//! - Calibration errors (degenerate geometry, registration failures)
//! - Validation errors (operator input rejected before any hardware step)
//! - Run errors (start/close requests that the run state machine refuses)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::data::Axis;
use thiserror::Error;

/// Error register code reported when the stage Z diverges from the last
/// position known to the software.
pub const Z_MISMATCH_CODE: u32 = 206;

/// Fault reported by a hardware call.
///
/// Every hardware operation returns `Result<T, HardwareFault>`; a fault is
/// always recoverable from the driver's point of view, but the operation in
/// progress decides whether to abandon the run or log and continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HardwareFault {
    /// Stage Z no longer matches the last known position (code 206).
    ///
    /// Requires physical verification by the operator; never retried.
    #[error("Z position mismatch: {cause}")]
    ZMismatch {
        /// Cause text reported by the driver.
        cause: String,
    },

    /// Any other error raised by the device.
    #[error("Hardware error {code}: {cause}")]
    Device {
        /// Numeric error code from the driver.
        code: u32,
        /// Cause text reported by the driver.
        cause: String,
    },

    /// The driver could not report a position.
    #[error("Position not available: {reason}")]
    PositionUnavailable {
        /// Why no position could be read.
        reason: String,
    },
}

impl HardwareFault {
    /// Build a fault from the contents of a legacy error register.
    pub fn from_register(code: u32, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        if code == Z_MISMATCH_CODE {
            HardwareFault::ZMismatch { cause }
        } else {
            HardwareFault::Device { code, cause }
        }
    }

    /// Numeric code of this fault (0 when the driver reported none).
    pub fn code(&self) -> u32 {
        match self {
            HardwareFault::ZMismatch { .. } => Z_MISMATCH_CODE,
            HardwareFault::Device { code, .. } => *code,
            HardwareFault::PositionUnavailable { .. } => 0,
        }
    }

    /// Cause text of this fault.
    pub fn cause(&self) -> &str {
        match self {
            HardwareFault::ZMismatch { cause } | HardwareFault::Device { cause, .. } => cause,
            HardwareFault::PositionUnavailable { reason } => reason,
        }
    }

    /// Check if this is a Z position mismatch
    pub fn is_z_mismatch(&self) -> bool {
        matches!(self, HardwareFault::ZMismatch { .. })
    }
}

/// Input validation error
///
/// Raised for malformed operator input before any hardware or computation
/// step runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Parameter value is not acceptable
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// The parameter name.
        param: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// Parameter value outside its allowed range
    #[error("Value {value} for '{param}' is outside [{min}, {max}]")]
    OutOfRange {
        /// The parameter name.
        param: String,
        /// The rejected value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidParameter`].
    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Reject `value` unless it is finite and strictly positive.
    pub fn require_positive(
        param: &str,
        value: f64,
    ) -> std::result::Result<f64, ValidationError> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::invalid(param, format!("must be > 0 (got {})", value)))
        }
    }

    /// Reject `value` unless it lies within `[min, max]`.
    pub fn require_range(
        param: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> std::result::Result<f64, ValidationError> {
        if value.is_finite() && value >= min && value <= max {
            Ok(value)
        } else {
            Err(ValidationError::OutOfRange {
                param: param.to_string(),
                value,
                min,
                max,
            })
        }
    }
}

/// Calibration error type
///
/// A calibration error is surfaced as a rejected proposal; it never produces
/// calibration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Primary displacement component of an axis is zero
    #[error("The {axis} shift has no displacement along {axis}; rotation is undefined")]
    DegenerateShift {
        /// The axis whose primary component is zero.
        axis: Axis,
    },

    /// The registration service failed to compute a shift
    #[error("Image registration failed: {reason}")]
    Registration {
        /// Cause reported by the registration service.
        reason: String,
    },

    /// Hardware fault during image acquisition
    #[error("Acquisition failed: {0}")]
    Hardware(#[from] HardwareFault),

    /// Operator input rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Run error type
///
/// Requests the run state machine refuses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    /// A run of this kind is already in flight
    #[error("{run} is already in progress")]
    Busy {
        /// Name of the run.
        run: String,
    },

    /// Close requested while a worker still owns the run state
    #[error("Cannot close while {run} is in progress")]
    CloseRefused {
        /// Name of the run.
        run: String,
    },

    /// The worker thread could not be started
    #[error("Failed to start {run}: {reason}")]
    WorkerUnavailable {
        /// Name of the run.
        run: String,
        /// Cause reported by the OS.
        reason: String,
    },

    /// Start parameters rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Main error type for SBEMKit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Hardware fault
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    /// Calibration error
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Run error
    #[error(transparent)]
    Run(#[from] RunError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a hardware fault
    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, Error::Hardware(_))
    }

    /// Check if this is a Z position mismatch, directly or during calibration
    pub fn is_z_mismatch(&self) -> bool {
        match self {
            Error::Hardware(fault) => fault.is_z_mismatch(),
            Error::Calibration(CalibrationError::Hardware(fault)) => fault.is_z_mismatch(),
            _ => false,
        }
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_register() {
        let fault = HardwareFault::from_register(206, "Z differs");
        assert!(fault.is_z_mismatch());
        assert_eq!(fault.code(), Z_MISMATCH_CODE);

        let fault = HardwareFault::from_register(203, "unresponsive");
        assert!(!fault.is_z_mismatch());
        assert_eq!(fault.code(), 203);
        assert_eq!(fault.cause(), "unresponsive");
    }

    #[test]
    fn test_validation_helpers() {
        assert_eq!(ValidationError::require_positive("thickness", 25.0), Ok(25.0));
        assert!(ValidationError::require_positive("thickness", 0.0).is_err());
        assert!(ValidationError::require_positive("thickness", f64::NAN).is_err());
        assert!(ValidationError::require_range("slices", 101.0, 1.0, 100.0).is_err());
    }

    #[test]
    fn test_error_classification() {
        let err: Error = HardwareFault::from_register(206, "Z differs").into();
        assert!(err.is_hardware_fault());
        assert!(err.is_z_mismatch());

        let err: Error = CalibrationError::DegenerateShift { axis: Axis::X }.into();
        assert!(!err.is_z_mismatch());
        assert!(err.to_string().contains("rotation is undefined"));
    }
}
