//! # SBEMKit Hardware
//!
//! Seams to the physical rig and the services the control layer depends on:
//! - [`Microtome`]: stage axes, knife and cut cycle (every call returns
//!   `Result<T, HardwareFault>`)
//! - [`Microscope`]: beam (EHT) control and frame acquisition
//! - [`ImageRegistration`]: pixel shift between two frames
//!
//! Drivers that still expose a sticky error register are wrapped by
//! [`RegisterAdapter`]. The [`simulator`] module provides an in-process rig
//! with scripted fault injection.

pub mod error_decoder;
pub mod legacy;
pub mod microscope;
pub mod microtome;
pub mod registration;
pub mod simulator;

pub use error_decoder::{decode_error, describe_fault};
pub use legacy::{LegacyDriver, RegisterAdapter};
pub use microscope::{FrameSettings, Microscope};
pub use microtome::{HardwareResult, Microtome};
pub use registration::{CorrelationRegistration, ImageRegistration, RegistrationError};
pub use simulator::{
    FaultRule, MicrotomeOp, SimulatedMicroscope, SimulatedMicrotome, SimulatedOptics,
};
