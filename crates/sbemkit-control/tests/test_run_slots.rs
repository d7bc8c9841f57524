//! One run at a time per slot, for every run type.

use sbemkit_control::{
    ApproachParams, ApproachSequencer, MotorStressTester, MotorTestParams, OperatorLog, RunPhase,
    RunSlot, RunStep, SlotPoll, StageCalibrationParams, StageCalibrationRun,
};
use sbemkit_core::{RunError, RunKind};
use sbemkit_hardware::{
    CorrelationRegistration, FrameSettings, SimulatedMicroscope, SimulatedMicrotome,
    SimulatedOptics,
};
use sbemkit_settings::MemoryCalibrationStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn slow_microtome() -> Arc<SimulatedMicrotome> {
    Arc::new(
        SimulatedMicrotome::new()
            .with_move_delay(Duration::from_millis(20))
            .with_cut_duration(Duration::from_millis(20)),
    )
}

fn assert_single_flight<S: RunStep>(kind: RunKind, make: impl Fn() -> S) {
    let mut slot = RunSlot::new(kind);
    assert!(slot.start_enabled());
    slot.launch(make()).expect("first launch");

    assert!(slot.is_running());
    assert!(!slot.start_enabled());
    assert!(matches!(slot.launch(make()), Err(RunError::Busy { .. })));
    assert!(matches!(slot.try_close(), Err(RunError::CloseRefused { .. })));

    slot.request_abort();
    let phase = loop {
        match slot.poll() {
            SlotPoll::Finished(phase) => break phase,
            SlotPoll::Idle => panic!("result lost"),
            _ => std::thread::sleep(Duration::from_millis(2)),
        }
    };
    assert!(phase.is_terminal());
    assert!(slot.outcome().is_some());
    assert!(slot.try_close().is_ok());
    assert_eq!(slot.poll(), SlotPoll::Idle);

    slot.acknowledge();
    assert_eq!(slot.phase(), RunPhase::Idle);
}

#[test]
fn test_approach_single_flight() {
    let microtome = slow_microtome();
    assert_single_flight(RunKind::Approach, || {
        let params = ApproachParams::validated(50, 50.0, 100).expect("params");
        ApproachSequencer::new(microtome.clone(), params, OperatorLog::new())
    });
}

#[test]
fn test_motor_test_single_flight() {
    let dir = tempdir().expect("tempdir");
    let microtome = slow_microtome();
    let log_path = dir.path().join("motor_test_log.txt");
    assert_single_flight(RunKind::MotorTest, || {
        let params = MotorTestParams::validated(1, 9999, &log_path).expect("params");
        MotorStressTester::new(microtome.clone(), params, OperatorLog::new())
    });
}

#[test]
fn test_calibration_single_flight() {
    let microtome = slow_microtome();
    let microscope = Arc::new(SimulatedMicroscope::new(
        microtome.clone(),
        SimulatedOptics::default(),
        5,
    ));
    let store = Arc::new(MemoryCalibrationStore::new());
    assert_single_flight(RunKind::StageCalibration, || {
        let params = StageCalibrationParams::validated(1.6, FrameSettings::default(), None)
            .expect("params");
        StageCalibrationRun::new(
            microtome.clone(),
            microscope.clone(),
            Arc::new(CorrelationRegistration::default()),
            store.clone(),
            params,
            OperatorLog::new(),
        )
    });
    assert_eq!(store.writes(), 0);
}

#[test]
fn test_slots_do_not_share_busy_state() {
    let microtome = slow_microtome();
    let mut approach = RunSlot::new(RunKind::Approach);
    let params = ApproachParams::validated(50, 50.0, 100).expect("params");
    approach
        .launch(ApproachSequencer::new(microtome.clone(), params, OperatorLog::new()))
        .expect("launch approach");

    let motor: RunSlot<MotorStressTester> = RunSlot::new(RunKind::MotorTest);
    assert!(motor.start_enabled());
    assert!(motor.try_close().is_ok());
    assert!(approach.try_close().is_err());

    approach.request_abort();
    assert_eq!(approach.wait(), RunPhase::Aborted);
}
