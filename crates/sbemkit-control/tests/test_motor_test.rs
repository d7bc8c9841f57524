use sbemkit_control::{MotorStressTester, MotorTestParams, OperatorLog, RunPhase, RunSlot, WalkBounds};
use sbemkit_core::{HardwareFault, RunKind, StagePosition};
use sbemkit_hardware::{FaultRule, MicrotomeOp, SimulatedMicrotome};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn params(log_path: &Path, moves: u64) -> MotorTestParams {
    MotorTestParams::validated(10, 9999, log_path)
        .expect("valid params")
        .with_seed(Some(11))
        .with_max_moves(moves)
}

fn run(microtome: &Arc<SimulatedMicrotome>, params: MotorTestParams) -> RunSlot<MotorStressTester> {
    let mut slot = RunSlot::new(RunKind::MotorTest);
    slot.launch(MotorStressTester::new(
        microtome.clone(),
        params,
        OperatorLog::new(),
    ))
    .expect("launch");
    slot.wait();
    slot
}

#[test]
fn test_error_count_matches_log() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("motor_test_log.txt");
    let start = StagePosition::new(12.0, -4.0, 30.0);
    let microtome = Arc::new(SimulatedMicrotome::new().with_position(start));
    for call in [3, 17, 40] {
        microtome.inject(FaultRule::on_call(
            MicrotomeOp::MoveXy,
            call,
            HardwareFault::Device {
                code: 202,
                cause: "XY timeout".to_string(),
            },
        ));
    }
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::MoveZ,
        25,
        HardwareFault::Device {
            code: 203,
            cause: "Z timeout".to_string(),
        },
    ));

    let slot = run(&microtome, params(&log_path, 60));
    assert_eq!(slot.phase(), RunPhase::Completed);

    let text = std::fs::read_to_string(&log_path).expect("log file");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 61);
    assert_eq!(*lines.last().expect("summary"), "NUMBER OF ERRORS: 4");

    let moves = &lines[..60];
    let failed = moves.iter().filter(|l| !l.ends_with(", OK")).count();
    assert_eq!(failed, 4);
    assert_eq!(moves.iter().filter(|l| l.contains("XY_ERROR")).count(), 3);
    assert_eq!(moves.iter().filter(|l| l.contains("Z_ERROR")).count(), 1);

    let snapshot = slot.snapshot();
    assert_eq!(snapshot.move_count, 60);
    assert_eq!(snapshot.error_count, failed as u64);
    assert_eq!(snapshot.xy_errors, 3);
    assert_eq!(snapshot.z_errors, 1);

    // Back to where the test started.
    assert_eq!(microtome.position(), start);
    let report = slot.report().expect("report");
    assert_eq!(report.error_count, 4);
    assert!(report.restore_warning.is_none());
}

#[test]
fn test_logged_positions_respect_bounds() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("walk.txt");
    let microtome = Arc::new(
        SimulatedMicrotome::new().with_position(StagePosition::new(0.0, 0.0, 0.05)),
    );
    let params = params(&log_path, 500)
        .with_bounds(WalkBounds {
            xy_um: 150.0,
            z_um: 1.0,
        })
        .expect("bounds");
    let slot = run(&microtome, params);
    assert_eq!(slot.phase(), RunPhase::Completed);

    let text = std::fs::read_to_string(&log_path).expect("log file");
    for line in text.lines().filter(|l| l.ends_with(", OK")) {
        let values: Vec<f64> = line
            .split(", ")
            .take(3)
            .map(|v| v.parse().expect("number"))
            .collect();
        assert!(values[0].abs() <= 150.0, "{line}");
        assert!(values[1].abs() <= 150.0, "{line}");
        assert!((0.0..=1.0).contains(&values[2]), "{line}");
    }
}

#[test]
fn test_failed_restore_warns() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("walk.txt");
    let microtome = Arc::new(SimulatedMicrotome::new());
    // Ten walk moves succeed, the restore move fails.
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::MoveZ,
        11,
        HardwareFault::Device {
            code: 203,
            cause: "Z timeout".to_string(),
        },
    ));
    let slot = run(&microtome, params(&log_path, 10));

    let report = slot.report().expect("report");
    assert_eq!(report.error_count, 0);
    let warning = report.restore_warning.as_deref().expect("warning");
    assert!(warning.contains("check the current z coordinate"));
}

#[test]
fn test_duration_out_of_range_is_rejected() {
    assert!(MotorTestParams::validated(0, 9999, "log.txt").is_err());
    assert!(MotorTestParams::validated(10_000, 9999, "log.txt").is_err());
}

#[test]
fn test_start_above_z_range_is_refused() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("walk.txt");
    let start = StagePosition::new(0.0, 0.0, 650.0);
    let microtome = Arc::new(SimulatedMicrotome::new().with_position(start));

    let slot = run(&microtome, params(&log_path, 5));
    assert_eq!(slot.phase(), RunPhase::Faulted);
    assert_eq!(microtome.calls(MicrotomeOp::MoveXy), 0);
    assert_eq!(microtome.calls(MicrotomeOp::MoveZ), 0);
    assert_eq!(microtome.position(), start);
    assert!(!log_path.exists());

    let report = slot.report().expect("report");
    assert_eq!(report.move_count, 0);
    assert!(report.outcome.message.contains("start_z"), "{}", report.outcome.message);
    assert!(report.restore_warning.is_none());
}

#[test]
fn test_walk_ends_when_duration_elapses() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("walk.txt");
    let microtome = Arc::new(
        SimulatedMicrotome::new()
            .with_position(StagePosition::new(0.0, 0.0, 20.0))
            .with_move_delay(Duration::from_millis(2)),
    );
    let mut params = MotorTestParams::validated(1, 9999, &log_path)
        .expect("valid params")
        .with_seed(Some(5));
    params.duration = Duration::from_millis(100);
    assert!(params.max_moves.is_none());

    let slot = run(&microtome, params);
    assert_eq!(slot.phase(), RunPhase::Completed);

    let snapshot = slot.snapshot();
    assert!(snapshot.move_count > 0);
    assert!(snapshot.elapsed >= Duration::from_millis(100));

    let text = std::fs::read_to_string(&log_path).expect("log file");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len() as u64, snapshot.move_count + 1);
    assert_eq!(*lines.last().expect("summary"), "NUMBER OF ERRORS: 0");
}

#[test]
fn test_z_mismatch_line_keeps_driver_cause() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("walk.txt");
    let microtome = Arc::new(
        SimulatedMicrotome::new().with_position(StagePosition::new(0.0, 0.0, 20.0)),
    );
    microtome.inject(FaultRule::on_call(
        MicrotomeOp::MoveZ,
        4,
        HardwareFault::from_register(206, "Z=20.1 expected 20.0"),
    ));

    let slot = run(&microtome, params(&log_path, 8));
    assert_eq!(slot.snapshot().z_errors, 1);

    let text = std::fs::read_to_string(&log_path).expect("log file");
    let failed: Vec<&str> = text.lines().filter(|l| l.contains("Z_ERROR")).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].ends_with("(Z=20.1 expected 20.0)"), "{}", failed[0]);
}
