//! Beam (EHT) switch
//!
//! The switch command returns immediately; the beam ramps on its own. The
//! run polls the state at a fixed interval until it matches or the attempts
//! run out.

use crate::log::{OperatorLog, SOURCE_SEM};
use crate::report::OutcomeReport;
use crate::run::{RunEnd, RunStep, StepOutcome};
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, HardwareEvent};
use sbemkit_core::{HardwareFault, RunKind, ThreadSafeRw};
use sbemkit_hardware::{describe_fault, Microscope};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default number of state polls before giving up
pub const EHT_MAX_POLLS: u32 = 15;
/// Default wait between polls
pub const EHT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BeamFault {
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    #[error("EHT did not switch {} within {waited:?}", on_off(.on))]
    Timeout { on: bool, waited: Duration },
}

fn on_off(on: &bool) -> &'static str {
    if *on {
        "on"
    } else {
        "off"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EhtSwitchState {
    pub target_on: bool,
    pub polls: u32,
    pub is_on: Option<bool>,
}

/// Switch EHT on or off and wait for it
pub struct EhtSwitchRun {
    microscope: Arc<dyn Microscope>,
    on: bool,
    interval: Duration,
    max_polls: u32,
    log: OperatorLog,
}

impl EhtSwitchRun {
    pub fn new(microscope: Arc<dyn Microscope>, on: bool, log: OperatorLog) -> Self {
        Self {
            microscope,
            on,
            interval: EHT_POLL_INTERVAL,
            max_polls: EHT_MAX_POLLS,
            log,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn label(&self) -> &'static str {
        if self.on {
            "ON"
        } else {
            "OFF"
        }
    }
}

impl RunStep for EhtSwitchRun {
    type Snapshot = EhtSwitchState;
    type Fault = BeamFault;
    type Report = OutcomeReport;

    fn kind(&self) -> RunKind {
        RunKind::EhtSwitch
    }

    fn initial_snapshot(&self) -> EhtSwitchState {
        EhtSwitchState {
            target_on: self.on,
            ..Default::default()
        }
    }

    fn begin(&mut self, _snapshot: &ThreadSafeRw<EhtSwitchState>) -> Result<(), BeamFault> {
        self.log
            .info(SOURCE_SEM, format!("Switching EHT {}.", self.label()));
        if self.on {
            self.microscope.turn_eht_on()?;
        } else {
            self.microscope.turn_eht_off()?;
        }
        Ok(())
    }

    fn step(&mut self, snapshot: &ThreadSafeRw<EhtSwitchState>) -> Result<StepOutcome, BeamFault> {
        let is_on = self.microscope.is_eht_on()?;
        let polls = {
            let mut state = snapshot.write();
            state.is_on = Some(is_on);
            state.polls
        };
        if is_on == self.on {
            return Ok(StepOutcome::Finished);
        }
        if polls >= self.max_polls {
            return Err(BeamFault::Timeout {
                on: self.on,
                waited: self.interval * polls,
            });
        }
        std::thread::sleep(self.interval);
        snapshot.write().polls += 1;
        Ok(StepOutcome::Continue)
    }

    fn finish(self, end: RunEnd<BeamFault>, _snapshot: &ThreadSafeRw<EhtSwitchState>) -> OutcomeReport {
        match end {
            RunEnd::Completed => {
                self.log.info(SOURCE_SEM, format!("EHT {}.", self.label()));
                emit!(AppEvent::Hardware(HardwareEvent::EhtChanged { on: self.on }));
                OutcomeReport::info(format!("EHT {}", self.label()), "The beam state was switched.")
            }
            RunEnd::Aborted => OutcomeReport::warning(
                "EHT switch interrupted",
                "Stopped waiting for the beam. Check the EHT status before acquiring.",
            ),
            RunEnd::Faulted(fault) => {
                let message = match &fault {
                    BeamFault::Hardware(f) => describe_fault(f),
                    timeout => timeout.to_string(),
                };
                self.log.error(SOURCE_SEM, message.clone());
                OutcomeReport::error(
                    "EHT error",
                    format!("{}\nCheck the microscope before switching again.", message),
                )
            }
        }
    }
}
