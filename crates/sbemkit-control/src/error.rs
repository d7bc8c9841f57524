//! Control-layer error type

use crate::task::TaskError;
use sbemkit_core::{CalibrationError, HardwareFault, RunError, ValidationError};
use sbemkit_settings::SettingsError;
use thiserror::Error;

/// Errors returned by control operations that run on the caller's thread
#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Result type for control operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;
