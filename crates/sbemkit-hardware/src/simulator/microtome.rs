//! Simulated microtome with scripted fault injection

use crate::microtome::{HardwareResult, Microtome};
use parking_lot::Mutex;
use sbemkit_core::{HardwareFault, StagePosition, XyPosition};
use std::collections::HashMap;
use std::time::Duration;

/// Microtome operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicrotomeOp {
    /// `stage_position` and `stage_z`
    ReadPosition,
    /// `move_to_xy`
    MoveXy,
    /// `move_to_z`
    MoveZ,
    /// `knife_near`
    KnifeNear,
    /// `knife_clear`
    KnifeClear,
    /// `full_cut_cycle`
    Cut,
    /// `cut_cycle_result`
    CutResult,
    /// `set_motor_speeds`
    SetMotorSpeeds,
}

/// A fault returned by a given operation
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRule {
    /// Operation the fault applies to.
    pub op: MicrotomeOp,
    /// 1-based call number that fails; `None` fails every call.
    pub call: Option<usize>,
    /// The fault returned.
    pub fault: HardwareFault,
}

impl FaultRule {
    /// Fail the `call`-th invocation of `op` (1-based).
    pub fn on_call(op: MicrotomeOp, call: usize, fault: HardwareFault) -> Self {
        Self {
            op,
            call: Some(call),
            fault,
        }
    }

    /// Fail every invocation of `op`.
    pub fn always(op: MicrotomeOp, fault: HardwareFault) -> Self {
        Self {
            op,
            call: None,
            fault,
        }
    }
}

#[derive(Debug)]
struct State {
    position: StagePosition,
    knife_near: bool,
    cuts: u32,
    cut_duration: Duration,
    motor_speeds: (f64, f64),
    move_delay: Duration,
    safe_z_step: f64,
    calls: HashMap<MicrotomeOp, usize>,
    rules: Vec<FaultRule>,
}

impl State {
    fn enter(&mut self, op: MicrotomeOp) -> HardwareResult<()> {
        let count = self.calls.entry(op).or_insert(0);
        *count += 1;
        let count = *count;
        match self
            .rules
            .iter()
            .find(|r| r.op == op && r.call.is_none_or(|c| c == count))
        {
            Some(rule) => {
                tracing::debug!("Simulated {:?} call {} fails: {}", op, count, rule.fault);
                Err(rule.fault.clone())
            }
            None => Ok(()),
        }
    }
}

/// In-process microtome
///
/// Moves complete instantly unless a move delay is configured. Faults are
/// scripted per operation and call number with [`FaultRule`]; a failed move
/// leaves the position unchanged.
#[derive(Debug)]
pub struct SimulatedMicrotome {
    state: Mutex<State>,
}

impl Default for SimulatedMicrotome {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMicrotome {
    /// Stage at the origin, 12 s cut cycle.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                position: StagePosition::default(),
                knife_near: false,
                cuts: 0,
                cut_duration: Duration::from_secs(12),
                motor_speeds: (40.0, 40.0),
                move_delay: Duration::ZERO,
                safe_z_step: 10.0,
                calls: HashMap::new(),
                rules: Vec::new(),
            }),
        }
    }

    /// Start at `position`.
    pub fn with_position(self, position: StagePosition) -> Self {
        self.state.lock().position = position;
        self
    }

    /// Nominal cut cycle duration.
    pub fn with_cut_duration(self, duration: Duration) -> Self {
        self.state.lock().cut_duration = duration;
        self
    }

    /// Time each move blocks for.
    pub fn with_move_delay(self, delay: Duration) -> Self {
        self.state.lock().move_delay = delay;
        self
    }

    /// Add a fault rule.
    pub fn inject(&self, rule: FaultRule) {
        self.state.lock().rules.push(rule);
    }

    /// Remove all fault rules.
    pub fn clear_faults(&self) {
        self.state.lock().rules.clear();
    }

    /// Position without going through fault injection.
    pub fn position(&self) -> StagePosition {
        self.state.lock().position
    }

    /// Number of times `op` was invoked.
    pub fn calls(&self, op: MicrotomeOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of cut cycles that started successfully.
    pub fn cuts(&self) -> u32 {
        self.state.lock().cuts
    }

    /// Whether the knife is in its near position.
    pub fn knife_is_near(&self) -> bool {
        self.state.lock().knife_near
    }

    fn delay(&self) {
        let delay = self.state.lock().move_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl Microtome for SimulatedMicrotome {
    fn stage_position(&self) -> HardwareResult<StagePosition> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::ReadPosition)?;
        Ok(state.position)
    }

    fn stage_z(&self) -> HardwareResult<f64> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::ReadPosition)?;
        Ok(state.position.z)
    }

    fn move_to_xy(&self, target: XyPosition) -> HardwareResult<()> {
        self.delay();
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::MoveXy)?;
        state.position.x = target.x;
        state.position.y = target.y;
        Ok(())
    }

    fn move_to_z(&self, z: f64, safe_mode: bool) -> HardwareResult<()> {
        self.delay();
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::MoveZ)?;
        if safe_mode && (z - state.position.z).abs() > state.safe_z_step {
            return Err(HardwareFault::Device {
                code: 203,
                cause: format!(
                    "Z step {:.3} exceeds safe limit {:.3}",
                    z - state.position.z,
                    state.safe_z_step
                ),
            });
        }
        state.position.z = z;
        Ok(())
    }

    fn knife_near(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::KnifeNear)?;
        state.knife_near = true;
        Ok(())
    }

    fn knife_clear(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::KnifeClear)?;
        state.knife_near = false;
        Ok(())
    }

    fn full_cut_cycle(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::Cut)?;
        state.cuts += 1;
        Ok(())
    }

    fn cut_cycle_result(&self) -> HardwareResult<()> {
        self.state.lock().enter(MicrotomeOp::CutResult)
    }

    fn full_cut_duration(&self) -> Duration {
        self.state.lock().cut_duration
    }

    fn set_full_cut_duration(&self, duration: Duration) -> HardwareResult<()> {
        self.state.lock().cut_duration = duration;
        Ok(())
    }

    fn motor_speeds(&self) -> (f64, f64) {
        self.state.lock().motor_speeds
    }

    fn set_motor_speeds(&self, x: f64, y: f64) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.enter(MicrotomeOp::SetMotorSpeeds)?;
        state.motor_speeds = (x, y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_on_nth_call() {
        let sim = SimulatedMicrotome::new();
        sim.inject(FaultRule::on_call(
            MicrotomeOp::MoveZ,
            2,
            HardwareFault::from_register(206, "mismatch"),
        ));
        assert!(sim.move_to_z(0.025, true).is_ok());
        let err = sim.move_to_z(0.05, true).expect_err("second move fails");
        assert!(err.is_z_mismatch());
        assert_eq!(sim.position().z, 0.025);
        assert!(sim.move_to_z(0.05, true).is_ok());
        assert_eq!(sim.calls(MicrotomeOp::MoveZ), 3);
    }

    #[test]
    fn test_safe_mode_limits_z_step() {
        let sim = SimulatedMicrotome::new();
        assert!(sim.move_to_z(100.0, true).is_err());
        assert!(sim.move_to_z(100.0, false).is_ok());
        assert_eq!(sim.position().z, 100.0);
    }
}
