//! Registration against frames rendered by the simulated microscope.

use sbemkit_core::{StageCalibration, XyPosition};
use sbemkit_hardware::{
    CorrelationRegistration, FrameSettings, ImageRegistration, Microscope, Microtome,
    SimulatedMicroscope, SimulatedMicrotome, SimulatedOptics,
};
use std::sync::Arc;

fn measure(truth: StageCalibration, dx_um: f64, dy_um: f64) -> (f64, f64) {
    let stage = Arc::new(SimulatedMicrotome::new());
    let optics = SimulatedOptics {
        truth,
        ..Default::default()
    };
    let scope = SimulatedMicroscope::new(stage.clone(), optics, 42);
    let settings = FrameSettings::default();

    let reference = scope.acquire_frame(&settings).expect("reference frame");
    stage
        .move_to_xy(XyPosition::new(dx_um, dy_um))
        .expect("stage move");
    let shifted = scope.acquire_frame(&settings).expect("shifted frame");

    let shift = CorrelationRegistration::default()
        .shift(&reference, &shifted)
        .expect("registration");
    (shift.dx, shift.dy)
}

#[test]
fn test_pure_x_move() {
    // 1.6 µm at 100 nm/px and unit scale is 16 px.
    let (dx, dy) = measure(StageCalibration::default(), 1.6, 0.0);
    assert!((dx - 16.0).abs() < 0.5, "dx = {dx}");
    assert!(dy.abs() < 0.5, "dy = {dy}");
}

#[test]
fn test_rotated_and_scaled_y_move() {
    let truth = StageCalibration {
        scale_x: 1.0,
        scale_y: 0.8,
        rotation_x: 0.0,
        rotation_y: 0.1,
    };
    let (dx, dy) = measure(truth, 0.0, 1.2);
    // 1.2 / 0.8 = 1.5 µm = 15 px, rotated by 0.1 rad.
    assert!((dx + 15.0 * 0.1f64.sin()).abs() < 0.5, "dx = {dx}");
    assert!((dy - 15.0 * 0.1f64.cos()).abs() < 0.5, "dy = {dy}");
}
