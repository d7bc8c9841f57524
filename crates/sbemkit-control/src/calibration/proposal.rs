//! Proposed stage calibrations
//!
//! Computed values never reach the store on their own. A proposal is held
//! by the presentation side until the operator confirms or discards it;
//! dropping it is the same as discarding.

use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, CalibrationEvent};
use sbemkit_core::{ShiftVector, StageCalibration};
use sbemkit_settings::{CalibrationStore, SettingsResult};
use std::fmt;

/// Stage calibration awaiting operator confirmation
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a proposal is only persisted by `confirm`"]
pub struct StageCalibrationProposal {
    eht_kv: f64,
    calibration: StageCalibration,
    shifts: Option<(ShiftVector, ShiftVector)>,
    previous: Option<StageCalibration>,
}

impl StageCalibrationProposal {
    /// Propose `calibration` for `eht_kv`, remembering what is stored now.
    pub fn new(
        eht_kv: f64,
        calibration: StageCalibration,
        shifts: Option<(ShiftVector, ShiftVector)>,
        store: &dyn CalibrationStore,
    ) -> Self {
        let previous = store.stage_calibration(eht_kv);
        emit!(AppEvent::Calibration(CalibrationEvent::Proposed {
            eht: eht_kv,
            calibration,
        }));
        Self {
            eht_kv,
            calibration,
            shifts,
            previous,
        }
    }

    pub fn eht_kv(&self) -> f64 {
        self.eht_kv
    }

    pub fn calibration(&self) -> StageCalibration {
        self.calibration
    }

    /// Measured shift vectors, when the proposal came from images or points.
    pub fn shifts(&self) -> Option<(ShiftVector, ShiftVector)> {
        self.shifts
    }

    /// Calibration stored for the same EHT when the proposal was made.
    pub fn previous(&self) -> Option<StageCalibration> {
        self.previous
    }

    /// Persist the proposal.
    pub fn confirm(self, store: &dyn CalibrationStore) -> SettingsResult<StageCalibration> {
        store.store_stage_calibration(self.eht_kv, self.calibration)?;
        tracing::info!(
            "Stage calibration for {:.2} kV confirmed: {}",
            self.eht_kv,
            self.calibration
        );
        emit!(AppEvent::Calibration(CalibrationEvent::Confirmed {
            eht: self.eht_kv,
            calibration: self.calibration,
        }));
        Ok(self.calibration)
    }

    /// Drop the proposal; the store is not touched.
    pub fn discard(self) {
        tracing::debug!("Stage calibration for {:.2} kV discarded", self.eht_kv);
        emit!(AppEvent::Calibration(CalibrationEvent::Discarded {
            eht: self.eht_kv
        }));
    }
}

impl fmt::Display for StageCalibrationProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((x, y)) = self.shifts {
            writeln!(f, "Shift_X: {}, Shift_Y: {}", x, y)?;
        }
        write!(f, "EHT {:.2} kV. {}", self.eht_kv, self.calibration)
    }
}
