//! Approach sequencer
//!
//! Removes `N` slices without imaging: read Z, bring the knife near, then
//! per cycle advance Z by the cutting thickness and run one full cut. Any
//! fault halts the run; completed slices are kept and reported. The knife
//! is always cleared afterwards.

use crate::log::{OperatorLog, SOURCE_CTRL, SOURCE_MICROTOME};
use crate::report::{OutcomeReport, RunReport};
use crate::run::{RunEnd, RunStep, StepOutcome};
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, HardwareEvent};
use sbemkit_core::units::{format_depth_um, format_duration, nm_to_um};
use sbemkit_core::{HardwareFault, RunKind, Severity, ThreadSafeRw, ValidationError};
use sbemkit_hardware::{describe_fault, Microtome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Why an approach stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaultKind {
    /// No fault.
    #[default]
    None,
    /// Stage Z diverged from the last known value (code 206).
    ZMismatch,
    /// Any other stage fault, including an unreadable Z.
    StageFault,
    /// Knife near or cut cycle failed.
    KnifeFault,
}

impl FaultKind {
    fn for_stage(fault: &HardwareFault) -> Self {
        if fault.is_z_mismatch() {
            FaultKind::ZMismatch
        } else {
            FaultKind::StageFault
        }
    }
}

/// Validated approach parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproachParams {
    /// Number of slices to cut
    pub target_slices: u32,
    /// Cutting thickness in nanometres
    pub thickness_nm: f64,
}

impl ApproachParams {
    /// Check operator input before anything touches the hardware.
    pub fn validated(
        target_slices: u32,
        thickness_nm: f64,
        max_slices: u32,
    ) -> Result<Self, ValidationError> {
        ValidationError::require_range("slices", target_slices as f64, 1.0, max_slices as f64)?;
        let thickness_nm = ValidationError::require_positive("thickness", thickness_nm)?;
        Ok(Self {
            target_slices,
            thickness_nm,
        })
    }

    /// Depth removed by `slices` cuts, in micrometres.
    pub fn depth_um(&self, slices: u32) -> f64 {
        slices as f64 * nm_to_um(self.thickness_nm)
    }
}

/// Shared approach state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApproachRun {
    pub target_slices: u32,
    pub thickness_nm: f64,
    pub completed_slices: u32,
    pub aborted: bool,
    pub fault_kind: FaultKind,
    /// Last Z commanded or read, µm.
    pub current_z: Option<f64>,
    /// Per-cycle duration used for the remaining-time estimate.
    pub cycle_estimate: Duration,
}

impl ApproachRun {
    /// Completed fraction in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.target_slices == 0 {
            0.0
        } else {
            self.completed_slices as f64 / self.target_slices as f64
        }
    }

    /// Completed fraction as a whole percentage.
    pub fn percent(&self) -> u32 {
        (self.progress() * 100.0) as u32
    }

    /// Estimated time until the last slice is cut.
    pub fn remaining(&self) -> Duration {
        self.cycle_estimate * self.target_slices.saturating_sub(self.completed_slices)
    }

    /// Status line such as `2/5 (40%) about 36 s remaining`.
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{}/{} ({}%)",
            self.completed_slices,
            self.target_slices,
            self.percent()
        );
        if self.completed_slices > 0 && self.completed_slices < self.target_slices {
            line.push_str(&format!(" about {} remaining", format_duration(self.remaining())));
        }
        line
    }
}

/// Fault that halted the approach
#[derive(Debug, Clone, PartialEq)]
pub struct ApproachFault {
    pub kind: FaultKind,
    pub fault: HardwareFault,
}

/// Outcome of an approach
#[derive(Debug, Clone, PartialEq)]
pub struct ApproachReport {
    pub outcome: OutcomeReport,
    pub completed_slices: u32,
    pub target_slices: u32,
    pub fault_kind: FaultKind,
    /// Depth removed in µm; `None` when the Z basis is no longer trusted.
    pub depth_removed_um: Option<f64>,
    /// Set when clearing the knife failed.
    pub cleanup_warning: Option<String>,
}

impl RunReport for ApproachReport {
    fn outcome(&self) -> &OutcomeReport {
        &self.outcome
    }
}

/// Approach run bound to a microtome
pub struct ApproachSequencer {
    microtome: Arc<dyn Microtome>,
    params: ApproachParams,
    z_retry: Duration,
    cycle_estimate: Duration,
    log: OperatorLog,
    z: f64,
}

impl ApproachSequencer {
    /// New approach. `z_retry` is the wait before the second Z read.
    pub fn new(microtome: Arc<dyn Microtome>, params: ApproachParams, log: OperatorLog) -> Self {
        Self {
            microtome,
            params,
            z_retry: Duration::from_secs(2),
            cycle_estimate: Duration::from_secs(12),
            log,
            z: 0.0,
        }
    }

    /// Wait between the two Z read attempts.
    pub fn with_z_retry(mut self, wait: Duration) -> Self {
        self.z_retry = wait;
        self
    }

    /// Per-cycle duration used for the remaining-time estimate.
    pub fn with_cycle_estimate(mut self, estimate: Duration) -> Self {
        self.cycle_estimate = estimate;
        self
    }

    fn read_z(&self) -> Result<f64, HardwareFault> {
        let first = match self.microtome.stage_z() {
            Ok(z) if z >= 0.0 => return Ok(z),
            Err(fault) if fault.is_z_mismatch() => return Err(fault),
            other => other,
        };
        tracing::debug!("Z read failed ({:?}), retrying in {:?}", first, self.z_retry);
        std::thread::sleep(self.z_retry);
        match self.microtome.stage_z() {
            Ok(z) if z >= 0.0 => Ok(z),
            Ok(z) => Err(HardwareFault::PositionUnavailable {
                reason: format!("negative Z reading {:.3}", z),
            }),
            Err(fault) => Err(fault),
        }
    }

    fn halt(&self, kind: FaultKind, fault: HardwareFault, message: &str) -> ApproachFault {
        self.log.error(SOURCE_CTRL, format!("{} Approach aborted.", message));
        emit!(AppEvent::Hardware(HardwareEvent::Fault {
            code: fault.code(),
            cause: fault.cause().to_string(),
        }));
        ApproachFault { kind, fault }
    }
}

impl RunStep for ApproachSequencer {
    type Snapshot = ApproachRun;
    type Fault = ApproachFault;
    type Report = ApproachReport;

    fn kind(&self) -> RunKind {
        RunKind::Approach
    }

    fn initial_snapshot(&self) -> ApproachRun {
        ApproachRun {
            target_slices: self.params.target_slices,
            thickness_nm: self.params.thickness_nm,
            cycle_estimate: self.cycle_estimate,
            ..Default::default()
        }
    }

    fn begin(&mut self, snapshot: &ThreadSafeRw<ApproachRun>) -> Result<(), ApproachFault> {
        self.z = match self.read_z() {
            Ok(z) => z,
            Err(fault) if fault.is_z_mismatch() => {
                return Err(self.halt(FaultKind::ZMismatch, fault, "Z position mismatch."))
            }
            Err(fault) => {
                return Err(self.halt(FaultKind::StageFault, fault, "Error reading Z position."))
            }
        };
        snapshot.write().current_z = Some(self.z);

        self.log.info(SOURCE_MICROTOME, "Moving knife to near position.");
        self.microtome.knife_near().map_err(|fault| {
            self.halt(
                FaultKind::KnifeFault,
                fault,
                "Error moving knife to near position.",
            )
        })?;
        emit!(AppEvent::Hardware(HardwareEvent::KnifeNear));
        Ok(())
    }

    fn step(&mut self, snapshot: &ThreadSafeRw<ApproachRun>) -> Result<StepOutcome, ApproachFault> {
        let target = self.z + nm_to_um(self.params.thickness_nm);
        self.log
            .info(SOURCE_MICROTOME, format!("Move to new Z: {:.3}", target));
        if let Err(fault) = self.microtome.move_to_z(target, true) {
            let kind = FaultKind::for_stage(&fault);
            let message = if kind == FaultKind::ZMismatch {
                "Z position mismatch."
            } else {
                "Z stage problem detected."
            };
            return Err(self.halt(kind, fault, message));
        }
        self.z = target;
        snapshot.write().current_z = Some(target);

        self.log.info(
            SOURCE_MICROTOME,
            format!(
                "Cutting in progress ({} nm cutting thickness).",
                self.params.thickness_nm
            ),
        );
        emit!(AppEvent::Hardware(HardwareEvent::CutStarted { z: target }));
        let cut = self.microtome.full_cut_cycle().and_then(|()| {
            std::thread::sleep(self.microtome.full_cut_duration());
            self.microtome.cut_cycle_result()
        });
        if let Err(fault) = cut {
            return Err(self.halt(FaultKind::KnifeFault, fault, "Cutting problem detected."));
        }

        self.log.info(SOURCE_MICROTOME, "Approach cut completed.");
        let mut state = snapshot.write();
        state.completed_slices += 1;
        Ok(if state.completed_slices >= self.params.target_slices {
            StepOutcome::Finished
        } else {
            StepOutcome::Continue
        })
    }

    fn finish(
        self,
        end: RunEnd<ApproachFault>,
        snapshot: &ThreadSafeRw<ApproachRun>,
    ) -> ApproachReport {
        self.log.info(SOURCE_MICROTOME, "Clearing knife.");
        let cleanup_warning = match self.microtome.knife_clear() {
            Ok(()) => {
                emit!(AppEvent::Hardware(HardwareEvent::KnifeCleared));
                None
            }
            Err(fault) => {
                self.log.error(SOURCE_CTRL, "Error clearing knife.");
                Some(format!(
                    "Warning: Clearing the knife failed ({}). Try to clear manually.",
                    describe_fault(&fault)
                ))
            }
        };

        let completed = {
            let mut state = snapshot.write();
            if let RunEnd::Faulted(f) = &end {
                state.fault_kind = f.kind;
            }
            state.aborted = !matches!(end, RunEnd::Completed);
            state.completed_slices
        };
        let depth = format_depth_um(self.params.depth_um(completed));

        let (outcome, fault_kind, depth_removed_um) = match end {
            RunEnd::Completed => (
                OutcomeReport::info(
                    "Approach finished",
                    format!(
                        "{} slices have been cut successfully. Total sample depth removed: {}.",
                        completed, depth
                    ),
                ),
                FaultKind::None,
                Some(self.params.depth_um(completed)),
            ),
            RunEnd::Aborted => (
                OutcomeReport::warning(
                    "Approach aborted",
                    format!(
                        "{} slices have been cut. Total sample depth removed: {}.",
                        completed, depth
                    ),
                ),
                FaultKind::None,
                Some(self.params.depth_um(completed)),
            ),
            RunEnd::Faulted(ApproachFault {
                kind: FaultKind::ZMismatch,
                fault,
            }) => (
                OutcomeReport::warning(
                    "Z position mismatch",
                    format!(
                        "{} Have you manually changed Z? Verify the physical Z position \
                         before resuming.",
                        describe_fault(&fault)
                    ),
                ),
                FaultKind::ZMismatch,
                None,
            ),
            RunEnd::Faulted(ApproachFault { kind, fault }) => {
                let (title, next_step) = match kind {
                    FaultKind::KnifeFault => (
                        "Cutting problem",
                        "Check the knife and the cutting cycle before resuming.",
                    ),
                    _ => (
                        "Z stage problem",
                        "Check the stage and the current Z position before resuming.",
                    ),
                };
                (
                    OutcomeReport::error(
                        title,
                        format!(
                            "{} {} slices have been cut. Total sample depth removed: {}. {}",
                            describe_fault(&fault),
                            completed,
                            depth,
                            next_step
                        ),
                    ),
                    kind,
                    Some(self.params.depth_um(completed)),
                )
            }
        };

        let outcome = match &cleanup_warning {
            Some(warning) => outcome.with_addendum(Severity::Warning, warning),
            None => outcome,
        };

        ApproachReport {
            outcome,
            completed_slices: completed,
            target_slices: self.params.target_slices,
            fault_kind,
            depth_removed_um,
            cleanup_warning,
        }
    }
}
