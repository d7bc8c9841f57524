use sbemkit_control::{
    ApproachParams, ApproachSequencer, FaultKind, OperatorLog, RunPhase, RunSlot,
};
use sbemkit_core::{HardwareFault, RunKind, Severity, StagePosition};
use sbemkit_hardware::{FaultRule, MicrotomeOp, SimulatedMicrotome};
use std::sync::Arc;
use std::time::Duration;

fn microtome() -> Arc<SimulatedMicrotome> {
    Arc::new(
        SimulatedMicrotome::new()
            .with_position(StagePosition::new(0.0, 0.0, 30.0))
            .with_cut_duration(Duration::ZERO),
    )
}

fn run(microtome: &Arc<SimulatedMicrotome>, slices: u32) -> RunSlot<ApproachSequencer> {
    let params = ApproachParams::validated(slices, 50.0, 100).expect("valid params");
    let sequencer = ApproachSequencer::new(microtome.clone(), params, OperatorLog::new())
        .with_z_retry(Duration::from_millis(1));
    let mut slot = RunSlot::new(RunKind::Approach);
    slot.launch(sequencer).expect("launch");
    slot.wait();
    slot
}

#[test]
fn test_five_slices_complete() {
    let microtome = microtome();
    let slot = run(&microtome, 5);

    assert_eq!(slot.phase(), RunPhase::Completed);
    let snapshot = slot.snapshot();
    assert_eq!(snapshot.completed_slices, 5);
    assert!(!snapshot.aborted);
    assert_eq!(snapshot.fault_kind, FaultKind::None);
    assert_eq!(microtome.cuts(), 5);
    assert!((microtome.position().z - 30.25).abs() < 1e-9);
    assert!(!microtome.knife_is_near());

    let report = slot.report().expect("report");
    assert_eq!(report.outcome.severity, Severity::Info);
    assert!(report.outcome.message.contains("5 slices have been cut successfully"));
    assert!(report.outcome.message.contains("0.250 µm"));
    assert_eq!(report.depth_removed_um, Some(0.25));
}

#[test]
fn test_z_mismatch_on_third_cycle() {
    let microtome = microtome();
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::MoveZ,
        3,
        HardwareFault::from_register(206, "Z differs from last known value"),
    ));
    let slot = run(&microtome, 5);

    assert_eq!(slot.phase(), RunPhase::Faulted);
    let snapshot = slot.snapshot();
    assert_eq!(snapshot.completed_slices, 2);
    assert!(snapshot.aborted);
    assert_eq!(snapshot.fault_kind, FaultKind::ZMismatch);
    assert_eq!(microtome.cuts(), 2);
    // The knife is cleared even after a fault.
    assert!(!microtome.knife_is_near());

    let report = slot.report().expect("report");
    assert_eq!(report.fault_kind, FaultKind::ZMismatch);
    assert_eq!(report.depth_removed_um, None);
    assert!(report.outcome.message.contains("Z position is correct"));
    assert!(!report.outcome.message.contains("depth removed"));
}

#[test]
fn test_knife_fault_keeps_partial_progress() {
    let microtome = microtome();
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::CutResult,
        4,
        HardwareFault::Device {
            code: 205,
            cause: "cut incomplete".to_string(),
        },
    ));
    let slot = run(&microtome, 5);

    assert_eq!(slot.phase(), RunPhase::Faulted);
    assert_eq!(slot.snapshot().completed_slices, 3);
    let report = slot.report().expect("report");
    assert_eq!(report.fault_kind, FaultKind::KnifeFault);
    assert_eq!(report.outcome.severity, Severity::Error);
    assert!(report.outcome.message.contains("0.150 µm"));
}

#[test]
fn test_unreadable_z_is_retried_once() {
    let microtome = microtome();
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::ReadPosition,
        1,
        HardwareFault::PositionUnavailable {
            reason: "timeout".to_string(),
        },
    ));
    let slot = run(&microtome, 2);
    assert_eq!(slot.phase(), RunPhase::Completed);
    assert_eq!(microtome.calls(MicrotomeOp::ReadPosition), 2);
}

#[test]
fn test_cleanup_failure_does_not_mask_outcome() {
    let microtome = microtome();
    microtome.inject(FaultRule::always(
        MicrotomeOp::KnifeClear,
        HardwareFault::Device {
            code: 204,
            cause: "knife stuck".to_string(),
        },
    ));
    let slot = run(&microtome, 3);

    assert_eq!(slot.phase(), RunPhase::Completed);
    let report = slot.report().expect("report");
    assert_eq!(report.completed_slices, 3);
    assert!(report.cleanup_warning.is_some());
    assert_eq!(report.outcome.severity, Severity::Warning);
    assert!(report.outcome.message.contains("3 slices have been cut successfully"));
    assert!(report.outcome.message.contains("Try to clear manually"));
}

#[test]
fn test_abort_between_cycles() {
    let microtome = Arc::new(
        SimulatedMicrotome::new()
            .with_position(StagePosition::new(0.0, 0.0, 30.0))
            .with_cut_duration(Duration::from_millis(20)),
    );
    let params = ApproachParams::validated(100, 25.0, 100).expect("valid params");
    let mut slot = RunSlot::new(RunKind::Approach);
    slot.launch(ApproachSequencer::new(
        microtome.clone(),
        params,
        OperatorLog::new(),
    ))
    .expect("launch");

    std::thread::sleep(Duration::from_millis(70));
    slot.request_abort();
    assert_eq!(slot.wait(), RunPhase::Aborted);

    let report = slot.report().expect("report");
    let done = report.completed_slices;
    assert!(done < 100);
    // A cycle in flight when the abort arrived still completes.
    assert_eq!(microtome.cuts(), done);
    assert_eq!(report.depth_removed_um, Some(done as f64 * 0.025));
    assert!(report.outcome.title.contains("aborted"));
}
