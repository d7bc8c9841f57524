//! Automatic stage calibration run
//!
//! Acquisition order: reference frame at the current position, frame after
//! a move of `+d` along X, frame after a move of `+d` along Y *from the
//! original position*, then back to the original position. Only then are the
//! shifts measured on the worker; the result is returned as a proposal.

use super::engine::{compute_parameters, measure_shifts};
use super::proposal::StageCalibrationProposal;
use crate::log::{OperatorLog, SOURCE_CAL, SOURCE_MICROTOME, SOURCE_SEM};
use crate::report::{OutcomeReport, RunReport};
use crate::run::{RunEnd, RunStep, StepOutcome};
use image::GrayImage;
use sbemkit_core::{
    CalibrationError, RunKind, Severity, ShiftVector, StageCalibration, StagePosition,
    ThreadSafeRw, ValidationError, XyPosition,
};
use sbemkit_hardware::{describe_fault, FrameSettings, ImageRegistration, Microscope, Microtome};
use sbemkit_settings::CalibrationStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// File names of the saved calibration frames, in acquisition order
pub const FRAME_FILES: [&str; 3] = ["start.tif", "shift_x.tif", "shift_y.tif"];

/// Stage calibration parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StageCalibrationParams {
    /// Stage move along each axis (µm)
    pub shift_distance_um: f64,
    pub frame: FrameSettings,
    /// Where to save the three frames, if anywhere
    pub save_dir: Option<PathBuf>,
}

impl StageCalibrationParams {
    pub fn validated(
        shift_distance_um: f64,
        frame: FrameSettings,
        save_dir: Option<PathBuf>,
    ) -> Result<Self, ValidationError> {
        ValidationError::require_positive("shift_distance", shift_distance_um)?;
        ValidationError::require_positive("pixel_size", frame.pixel_size_nm)?;
        ValidationError::require_positive("dwell_time", frame.dwell_time_us)?;
        if frame.width == 0 || frame.height == 0 {
            return Err(ValidationError::invalid("frame_size", "must not be empty"));
        }
        Ok(Self {
            shift_distance_um,
            frame,
            save_dir,
        })
    }
}

/// Where the calibration run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStep {
    #[default]
    CaptureReference,
    MoveX,
    CaptureX,
    MoveY,
    CaptureY,
    Restore,
    ComputeShifts,
    Done,
}

impl CalibrationStep {
    /// Number of steps after the starting position has been read.
    pub const COUNT: u32 = 7;

    fn next(self) -> Self {
        match self {
            CalibrationStep::CaptureReference => CalibrationStep::MoveX,
            CalibrationStep::MoveX => CalibrationStep::CaptureX,
            CalibrationStep::CaptureX => CalibrationStep::MoveY,
            CalibrationStep::MoveY => CalibrationStep::CaptureY,
            CalibrationStep::CaptureY => CalibrationStep::Restore,
            CalibrationStep::Restore => CalibrationStep::ComputeShifts,
            CalibrationStep::ComputeShifts | CalibrationStep::Done => CalibrationStep::Done,
        }
    }
}

impl fmt::Display for CalibrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CalibrationStep::CaptureReference => "Acquiring reference image",
            CalibrationStep::MoveX => "Moving along X",
            CalibrationStep::CaptureX => "Acquiring X-shifted image",
            CalibrationStep::MoveY => "Moving along Y",
            CalibrationStep::CaptureY => "Acquiring Y-shifted image",
            CalibrationStep::Restore => "Returning to start position",
            CalibrationStep::ComputeShifts => "Computing pixel shifts",
            CalibrationStep::Done => "Done",
        };
        f.write_str(text)
    }
}

/// Shared calibration run state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageCalibrationState {
    pub step: CalibrationStep,
    pub completed_steps: u32,
    pub origin: Option<StagePosition>,
    pub eht_kv: f64,
}

/// Outcome of a calibration run
#[derive(Debug)]
pub struct StageCalibrationReport {
    pub outcome: OutcomeReport,
    /// Present only when the run completed.
    pub proposal: Option<StageCalibrationProposal>,
    pub restore_warning: Option<String>,
}

impl RunReport for StageCalibrationReport {
    fn outcome(&self) -> &OutcomeReport {
        &self.outcome
    }
}

/// Automatic stage calibration bound to a rig
pub struct StageCalibrationRun {
    microtome: Arc<dyn Microtome>,
    microscope: Arc<dyn Microscope>,
    registration: Arc<dyn ImageRegistration>,
    store: Arc<dyn CalibrationStore>,
    params: StageCalibrationParams,
    log: OperatorLog,
    origin: Option<StagePosition>,
    /// XY is back at `origin` after the acquisition.
    restored: bool,
    eht_kv: f64,
    frames: Vec<GrayImage>,
    result: Option<((ShiftVector, ShiftVector), StageCalibration)>,
}

impl StageCalibrationRun {
    pub fn new(
        microtome: Arc<dyn Microtome>,
        microscope: Arc<dyn Microscope>,
        registration: Arc<dyn ImageRegistration>,
        store: Arc<dyn CalibrationStore>,
        params: StageCalibrationParams,
        log: OperatorLog,
    ) -> Self {
        let eht_kv = microscope.eht_kv();
        Self {
            microtome,
            microscope,
            registration,
            store,
            params,
            log,
            origin: None,
            restored: false,
            eht_kv,
            frames: Vec::with_capacity(3),
            result: None,
        }
    }

    fn capture(&mut self) -> Result<(), CalibrationError> {
        let frame = self.microscope.acquire_frame(&self.params.frame)?;
        if let Some(dir) = &self.params.save_dir {
            let path = dir.join(FRAME_FILES[self.frames.len()]);
            match frame.save(&path) {
                Ok(()) => self
                    .log
                    .info(SOURCE_SEM, format!("Saved {}", path.display())),
                Err(e) => tracing::warn!("Could not save {}: {}", path.display(), e),
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    fn move_from_origin(&self, dx: f64, dy: f64) -> Result<(), CalibrationError> {
        let origin = self.origin.unwrap_or_default().xy();
        let target = origin.offset(dx, dy);
        self.log.info(
            SOURCE_MICROTOME,
            format!("Moving stage to X{:.3} Y{:.3}", target.x, target.y),
        );
        self.microtome.move_to_xy(target)?;
        Ok(())
    }

    fn compute(&mut self) -> Result<(), CalibrationError> {
        let [reference, shifted_x, shifted_y] = self.frames.as_slice() else {
            return Err(CalibrationError::Registration {
                reason: format!("expected 3 frames, have {}", self.frames.len()),
            });
        };
        self.log.info(SOURCE_CAL, "Now computing pixel shifts...");
        let (shift_x, shift_y) =
            measure_shifts(self.registration.as_ref(), reference, shifted_x, shifted_y)?;
        self.log.info(
            SOURCE_CAL,
            format!("Shift_X: {}, Shift_Y: {}", shift_x, shift_y),
        );
        let calibration = compute_parameters(
            shift_x,
            shift_y,
            self.params.shift_distance_um,
            self.params.frame.pixel_size_nm,
        )?;
        self.result = Some(((shift_x, shift_y), calibration));
        Ok(())
    }
}

impl RunStep for StageCalibrationRun {
    type Snapshot = StageCalibrationState;
    type Fault = CalibrationError;
    type Report = StageCalibrationReport;

    fn kind(&self) -> RunKind {
        RunKind::StageCalibration
    }

    fn initial_snapshot(&self) -> StageCalibrationState {
        StageCalibrationState {
            eht_kv: self.eht_kv,
            ..Default::default()
        }
    }

    fn begin(
        &mut self,
        snapshot: &ThreadSafeRw<StageCalibrationState>,
    ) -> Result<(), CalibrationError> {
        let origin = self.microtome.stage_position()?;
        self.origin = Some(origin);
        snapshot.write().origin = Some(origin);
        self.log.info(
            SOURCE_CAL,
            format!(
                "Stage calibration at {:.2} kV started from {}",
                self.eht_kv, origin
            ),
        );
        Ok(())
    }

    fn step(
        &mut self,
        snapshot: &ThreadSafeRw<StageCalibrationState>,
    ) -> Result<StepOutcome, CalibrationError> {
        let step = snapshot.read().step;
        let distance = self.params.shift_distance_um;
        match step {
            CalibrationStep::CaptureReference
            | CalibrationStep::CaptureX
            | CalibrationStep::CaptureY => self.capture()?,
            CalibrationStep::MoveX => self.move_from_origin(distance, 0.0)?,
            CalibrationStep::MoveY => self.move_from_origin(0.0, distance)?,
            CalibrationStep::Restore => {
                self.move_from_origin(0.0, 0.0)?;
                self.restored = true;
            }
            CalibrationStep::ComputeShifts => self.compute()?,
            CalibrationStep::Done => return Ok(StepOutcome::Finished),
        }

        let mut state = snapshot.write();
        state.step = step.next();
        state.completed_steps += 1;
        Ok(if state.step == CalibrationStep::Done {
            StepOutcome::Finished
        } else {
            StepOutcome::Continue
        })
    }

    fn finish(
        self,
        end: RunEnd<CalibrationError>,
        _snapshot: &ThreadSafeRw<StageCalibrationState>,
    ) -> StageCalibrationReport {
        // Only needed when the run stopped before its own restore step.
        let pending = self.origin.filter(|_| !self.restored);
        let restore_warning = pending.and_then(|origin| {
            let home = XyPosition::new(origin.x, origin.y);
            match self.microtome.move_to_xy(home) {
                Ok(()) => None,
                Err(fault) => Some(format!(
                    "The stage could not be moved back to its starting position ({}). {}",
                    origin,
                    describe_fault(&fault)
                )),
            }
        });

        let (outcome, proposal) = match (end, self.result) {
            (RunEnd::Completed, Some((shifts, calibration))) => {
                let proposal = StageCalibrationProposal::new(
                    self.eht_kv,
                    calibration,
                    Some(shifts),
                    self.store.as_ref(),
                );
                (
                    OutcomeReport::info(
                        "Calculated parameters",
                        format!(
                            "Results:\n{}\n\nConfirm to use these values for {:.2} kV.",
                            calibration, self.eht_kv
                        ),
                    ),
                    Some(proposal),
                )
            }
            (RunEnd::Aborted, _) | (RunEnd::Completed, None) => (
                OutcomeReport::warning(
                    "Calibration aborted",
                    "Stage calibration was aborted. No values were changed.",
                ),
                None,
            ),
            (RunEnd::Faulted(e), _) => {
                let message = match &e {
                    CalibrationError::Hardware(fault) => describe_fault(fault),
                    other => other.to_string(),
                };
                self.log.error(SOURCE_CAL, format!("Calibration failed: {}", message));
                (
                    OutcomeReport::error(
                        "Error",
                        format!(
                            "An error occurred during the stage calibration: {}\n\
                             Make sure that structure is visible in the images and \
                             that the beam is focused, then try again.",
                            message
                        ),
                    ),
                    None,
                )
            }
        };

        let outcome = match &restore_warning {
            Some(warning) => outcome.with_addendum(Severity::Warning, warning),
            None => outcome,
        };
        StageCalibrationReport {
            outcome,
            proposal,
            restore_warning,
        }
    }
}
