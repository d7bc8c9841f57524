//! Stage, motor and magnification calibration
//!
//! [`engine`] holds the math, [`stage`] the automatic acquisition run and
//! [`proposal`] the confirm/discard protocol. Nothing here writes to the
//! calibration store without an explicit confirmation.

pub mod engine;
pub mod motor;
pub mod proposal;
pub mod stage;

pub use engine::{compute_parameters, measure_shifts, measure_shifts_from_points, PointPair};
pub use motor::{apply_cut_duration, MagnificationProposal, MotorSpeedProposal};
pub use proposal::StageCalibrationProposal;
pub use stage::{
    CalibrationStep, StageCalibrationParams, StageCalibrationReport, StageCalibrationRun,
    StageCalibrationState, FRAME_FILES,
};

use sbemkit_core::CalibrationError;
use sbemkit_settings::CalibrationStore;

/// Manual fallback: propose a calibration from operator-picked feature
/// positions in the three saved frames.
pub fn propose_from_points(
    x_points: PointPair,
    y_points: PointPair,
    shift_distance_um: f64,
    pixel_size_nm: f64,
    eht_kv: f64,
    store: &dyn CalibrationStore,
) -> Result<StageCalibrationProposal, CalibrationError> {
    let (shift_x, shift_y) = measure_shifts_from_points(x_points, y_points)?;
    let calibration = compute_parameters(shift_x, shift_y, shift_distance_um, pixel_size_nm)?;
    Ok(StageCalibrationProposal::new(
        eht_kv,
        calibration,
        Some((shift_x, shift_y)),
        store,
    ))
}
