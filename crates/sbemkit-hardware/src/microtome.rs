//! Microtome and stage driver seam
//!
//! Every call blocks until the hardware acknowledges it and reports faults
//! through its return value. Callers never read or clear a shared error
//! register; drivers that have one are wrapped by
//! [`RegisterAdapter`](crate::RegisterAdapter).

use sbemkit_core::{HardwareFault, StagePosition, XyPosition};
use std::time::Duration;

/// Result type for hardware calls
pub type HardwareResult<T> = std::result::Result<T, HardwareFault>;

/// Microtome with an XY stage and a Z (cutting depth) axis
///
/// Implementations are shared between the presentation side (which only
/// reads cheap cached values) and one worker at a time, so all methods
/// take `&self`.
pub trait Microtome: Send + Sync {
    /// Current stage position in micrometres.
    fn stage_position(&self) -> HardwareResult<StagePosition>;

    /// Current Z in micrometres.
    fn stage_z(&self) -> HardwareResult<f64>;

    /// Move the XY stage to `target`.
    fn move_to_xy(&self, target: XyPosition) -> HardwareResult<()>;

    /// Move Z to `z`.
    ///
    /// With `safe_mode` the driver limits the step size and refuses moves
    /// larger than its safety threshold. Large intentional restorations pass
    /// `safe_mode = false`.
    fn move_to_z(&self, z: f64, safe_mode: bool) -> HardwareResult<()>;

    /// Bring the knife close to the block face.
    fn knife_near(&self) -> HardwareResult<()>;

    /// Retract the knife away from the block face.
    fn knife_clear(&self) -> HardwareResult<()>;

    /// Start one full cut-and-retract cycle.
    ///
    /// Returns once the cycle is started; the caller waits
    /// [`full_cut_duration`](Self::full_cut_duration) and then calls
    /// [`cut_cycle_result`](Self::cut_cycle_result).
    fn full_cut_cycle(&self) -> HardwareResult<()>;

    /// Fault raised while the last cut cycle ran, if any.
    fn cut_cycle_result(&self) -> HardwareResult<()>;

    /// Nominal duration of a full cut cycle.
    fn full_cut_duration(&self) -> Duration;

    /// Change the nominal cut cycle duration.
    fn set_full_cut_duration(&self, duration: Duration) -> HardwareResult<()>;

    /// XY motor speeds in µm/s.
    fn motor_speeds(&self) -> (f64, f64);

    /// Write XY motor speeds in µm/s.
    fn set_motor_speeds(&self, x: f64, y: f64) -> HardwareResult<()>;
}
