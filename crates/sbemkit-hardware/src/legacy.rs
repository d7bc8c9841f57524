//! Adapter for drivers that report faults through an error register
//!
//! Older microtome drivers return nothing from their commands and instead
//! latch a numeric code and cause text that stay set until explicitly reset.
//! [`RegisterAdapter`] turns such a driver into a [`Microtome`]: the driver
//! lock is held across each command and its register check, and any latched
//! fault is read, reset and returned as a [`HardwareFault`].

use crate::microtome::{HardwareResult, Microtome};
use parking_lot::Mutex;
use sbemkit_core::{HardwareFault, StagePosition, XyPosition};
use std::time::Duration;

/// Driver with a sticky error register
pub trait LegacyDriver: Send {
    /// Stage position, or `None` when the controller did not answer.
    fn get_stage_xyz(&mut self) -> Option<(f64, f64, f64)>;
    /// Stage Z, or `None` when the controller did not answer.
    fn get_stage_z(&mut self) -> Option<f64>;
    /// Move the XY stage.
    fn move_stage_to_xy(&mut self, x: f64, y: f64);
    /// Move Z.
    fn move_stage_to_z(&mut self, z: f64, safe_mode: bool);
    /// Knife to near position.
    fn near_knife(&mut self);
    /// Knife to clear position.
    fn clear_knife(&mut self);
    /// Start one full cut cycle.
    fn do_full_cut(&mut self);
    /// Nominal cut cycle duration in seconds.
    fn full_cut_duration(&self) -> f64;
    /// Set the nominal cut cycle duration in seconds.
    fn set_full_cut_duration(&mut self, seconds: f64);
    /// XY motor speeds.
    fn motor_speeds(&self) -> (f64, f64);
    /// Write XY motor speeds; `false` if the controller rejected them.
    fn set_motor_speeds(&mut self, x: f64, y: f64) -> bool;
    /// Latched error code (0 when clear).
    fn error_state(&self) -> u32;
    /// Cause text for the latched error.
    fn error_info(&self) -> String;
    /// Clear the latched error.
    fn reset_error_state(&mut self);
}

/// [`Microtome`] over a [`LegacyDriver`]
pub struct RegisterAdapter<D: LegacyDriver> {
    driver: Mutex<D>,
}

impl<D: LegacyDriver> RegisterAdapter<D> {
    /// Wrap a driver.
    pub fn new(driver: D) -> Self {
        Self {
            driver: Mutex::new(driver),
        }
    }

    /// Unwrap the driver.
    pub fn into_inner(self) -> D {
        self.driver.into_inner()
    }

    /// Run `op` and then drain the register, all under one lock.
    fn call<T>(&self, op: impl FnOnce(&mut D) -> T) -> HardwareResult<T> {
        let mut driver = self.driver.lock();
        let value = op(&mut driver);
        take_fault(&mut *driver)?;
        Ok(value)
    }
}

/// Read and reset the register; the register is always clear afterwards.
fn take_fault<D: LegacyDriver + ?Sized>(driver: &mut D) -> HardwareResult<()> {
    let code = driver.error_state();
    if code == 0 {
        return Ok(());
    }
    let fault = HardwareFault::from_register(code, driver.error_info());
    driver.reset_error_state();
    tracing::warn!("Driver register reported {}; cleared", fault);
    Err(fault)
}

impl<D: LegacyDriver> Microtome for RegisterAdapter<D> {
    fn stage_position(&self) -> HardwareResult<StagePosition> {
        self.call(|d| d.get_stage_xyz())?
            .map(|(x, y, z)| StagePosition::new(x, y, z))
            .ok_or_else(|| HardwareFault::PositionUnavailable {
                reason: "stage did not report XYZ".to_string(),
            })
    }

    fn stage_z(&self) -> HardwareResult<f64> {
        self.call(|d| d.get_stage_z())?
            .ok_or_else(|| HardwareFault::PositionUnavailable {
                reason: "stage did not report Z".to_string(),
            })
    }

    fn move_to_xy(&self, target: XyPosition) -> HardwareResult<()> {
        self.call(|d| d.move_stage_to_xy(target.x, target.y))
    }

    fn move_to_z(&self, z: f64, safe_mode: bool) -> HardwareResult<()> {
        self.call(|d| d.move_stage_to_z(z, safe_mode))
    }

    fn knife_near(&self) -> HardwareResult<()> {
        self.call(|d| d.near_knife())
    }

    fn knife_clear(&self) -> HardwareResult<()> {
        self.call(|d| d.clear_knife())
    }

    fn full_cut_cycle(&self) -> HardwareResult<()> {
        self.call(|d| d.do_full_cut())
    }

    fn cut_cycle_result(&self) -> HardwareResult<()> {
        self.call(|_| ())
    }

    fn full_cut_duration(&self) -> Duration {
        let seconds = self.driver.lock().full_cut_duration();
        Duration::try_from_secs_f64(seconds).unwrap_or_default()
    }

    fn set_full_cut_duration(&self, duration: Duration) -> HardwareResult<()> {
        self.call(|d| d.set_full_cut_duration(duration.as_secs_f64()))
    }

    fn motor_speeds(&self) -> (f64, f64) {
        self.driver.lock().motor_speeds()
    }

    fn set_motor_speeds(&self, x: f64, y: f64) -> HardwareResult<()> {
        if self.call(|d| d.set_motor_speeds(x, y))? {
            Ok(())
        } else {
            Err(HardwareFault::Device {
                code: 0,
                cause: "controller rejected motor speeds".to_string(),
            })
        }
    }
}
