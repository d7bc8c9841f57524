//! # SBEMKit
//!
//! Operator controls for serial block-face electron microscopy rigs:
//! automatic stage calibration from image shifts, stepwise approach cutting
//! with the microtome, and a randomised motor stress test.
//!
//! ## Architecture
//!
//! SBEMKit is organized as a workspace with multiple crates:
//!
//! 1. **sbemkit-core** - Stage data model, fault taxonomy, units, event bus
//! 2. **sbemkit-hardware** - Microtome/microscope/registration seams and a simulated rig
//! 3. **sbemkit-settings** - Configuration files and the per-EHT calibration store
//! 4. **sbemkit-control** - Background runs and the shared run state machine
//! 5. **sbemkit** - This crate: re-exports, logging setup and the operator console

pub use sbemkit_control as control;
pub use sbemkit_core::{event_bus, units};
pub use sbemkit_hardware as hardware;
pub use sbemkit_settings as settings;

pub use sbemkit_core::{
    thread_safe, CalibrationError, Error, HardwareFault, Result, RunError, ShiftVector,
    StageCalibration, StagePosition, ThreadSafe, ValidationError, XyPosition,
};

pub use sbemkit_control::{
    ApproachSequencer, MotorStressTester, OperatorLog, OutcomeReport, Rig, RunPhase, RunSlot,
    RunStep, SlotPoll, StageCalibrationRun,
};

pub use sbemkit_settings::{Config, SettingsManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support (default level INFO)
/// - Pretty formatting with targets, thread names and line numbers
/// - Output to `log_file` when given, stderr otherwise
pub fn init_logging(log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    use std::fs::OpenOptions;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let fmt_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        None => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
