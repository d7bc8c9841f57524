//! # SBEMKit Core
//!
//! Core types, errors, and utilities for SBEMKit.
//! Provides the stage data model, the fault taxonomy shared by every
//! hardware-driving run, unit conversions, and the application event bus.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod types;
pub mod units;

pub use data::{Axis, ShiftVector, StageCalibration, StagePosition, XyPosition};

pub use error::{
    CalibrationError, Error, HardwareFault, Result, RunError, ValidationError, Z_MISMATCH_CODE,
};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, init_event_bus, AppEvent, EventBus, EventBusConfig, EventCategory, EventFilter,
    EventRecord, RunKind, Severity,
};

// Re-export type aliases for convenience
pub use types::{
    thread_safe, thread_safe_rw, thread_safe_vec, ThreadSafe, ThreadSafeRw, ThreadSafeVec,
};
