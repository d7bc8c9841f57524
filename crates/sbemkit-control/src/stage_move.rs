//! Single stage move on a worker

use crate::log::{OperatorLog, SOURCE_CTRL, SOURCE_MICROTOME};
use crate::report::OutcomeReport;
use crate::run::{RunEnd, RunStep, StepOutcome};
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, HardwareEvent};
use sbemkit_core::{HardwareFault, RunKind, ThreadSafeRw, XyPosition};
use sbemkit_hardware::{describe_fault, Microtome};
use std::sync::Arc;

const MOVE_FAILED: &str = "An error was detected during the move. Please try again.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageMoveState {
    pub target: XyPosition,
    pub moved: bool,
}

/// Move the XY stage to one target
pub struct StageMoveRun {
    microtome: Arc<dyn Microtome>,
    target: XyPosition,
    log: OperatorLog,
}

impl StageMoveRun {
    pub fn new(microtome: Arc<dyn Microtome>, target: XyPosition, log: OperatorLog) -> Self {
        Self {
            microtome,
            target,
            log,
        }
    }
}

impl RunStep for StageMoveRun {
    type Snapshot = StageMoveState;
    type Fault = HardwareFault;
    type Report = OutcomeReport;

    fn kind(&self) -> RunKind {
        RunKind::StageMove
    }

    fn initial_snapshot(&self) -> StageMoveState {
        StageMoveState {
            target: self.target,
            moved: false,
        }
    }

    fn step(&mut self, snapshot: &ThreadSafeRw<StageMoveState>) -> Result<StepOutcome, HardwareFault> {
        self.log.info(
            SOURCE_MICROTOME,
            format!("Moving stage to X{:.3} Y{:.3}", self.target.x, self.target.y),
        );
        self.microtome.move_to_xy(self.target)?;
        snapshot.write().moved = true;
        if let Ok(position) = self.microtome.stage_position() {
            emit!(AppEvent::Hardware(HardwareEvent::StageMoved { position }));
        }
        Ok(StepOutcome::Finished)
    }

    fn finish(self, end: RunEnd<HardwareFault>, _snapshot: &ThreadSafeRw<StageMoveState>) -> OutcomeReport {
        match end {
            RunEnd::Completed => OutcomeReport::info(
                "Move complete",
                format!("Stage moved to X{:.3} Y{:.3}.", self.target.x, self.target.y),
            ),
            RunEnd::Aborted => OutcomeReport::warning("Move cancelled", "The stage was not moved."),
            RunEnd::Faulted(fault) => {
                self.log
                    .error(SOURCE_CTRL, format!("Stage move failed: {}", describe_fault(&fault)));
                OutcomeReport::error(
                    "Error",
                    format!("{}\n({})", MOVE_FAILED, describe_fault(&fault)),
                )
            }
        }
    }
}
