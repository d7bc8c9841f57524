//! # SBEMKit Control
//!
//! Long-running hardware operations and the machinery that runs them off
//! the presentation thread:
//!
//! - [`task`]: worker threads with progress pings and a single result
//! - [`run`]: the shared `Idle -> Running -> {Completed, Aborted, Faulted}`
//!   state machine and the [`RunSlot`] that owns one run at a time
//! - [`approach`], [`motor_test`], [`calibration`]: the runs themselves
//! - [`stage_move`], [`beam`]: single-purpose helper runs
//!
//! Every run ends in a [`report::OutcomeReport`] written for the operator.

pub mod approach;
pub mod beam;
pub mod calibration;
pub mod error;
pub mod log;
pub mod report;
pub mod rig;
pub mod run;
pub mod stage_move;
pub mod task;

pub use approach::{ApproachParams, ApproachReport, ApproachRun, ApproachSequencer, FaultKind};
pub use beam::{BeamFault, EhtSwitchRun, EhtSwitchState};
pub use calibration::{
    compute_parameters, measure_shifts, measure_shifts_from_points, propose_from_points,
    MagnificationProposal, MotorSpeedProposal, PointPair, StageCalibrationParams,
    StageCalibrationProposal, StageCalibrationReport, StageCalibrationRun,
};
pub use error::{ControlError, ControlResult};
pub use log::OperatorLog;
pub use motor_test::{
    MotorStressTester, MotorTestFault, MotorTestParams, MotorTestReport, MotorTestRun,
    MoveOutcome, MoveRecord, WalkBounds,
};
pub use report::{OutcomeReport, RunReport};
pub use rig::Rig;
pub use run::{drive, RunEnd, RunPhase, RunSlot, RunStep, SlotPoll, StepOutcome};
pub use stage_move::{StageMoveRun, StageMoveState};
pub use task::{CancelToken, TaskContext, TaskError, TaskHandle, TaskPoll, TaskRunner};
