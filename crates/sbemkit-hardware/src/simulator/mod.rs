//! Simulated rig
//!
//! A microtome and a microscope that share one stage, for tests and for
//! running the operator console without hardware.

mod microscope;
mod microtome;

pub use microscope::{SimulatedMicroscope, SimulatedOptics};
pub use microtome::{FaultRule, MicrotomeOp, SimulatedMicrotome};
