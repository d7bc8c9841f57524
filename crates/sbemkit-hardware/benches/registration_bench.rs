use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sbemkit_core::{StageCalibration, XyPosition};
use sbemkit_hardware::{
    CorrelationRegistration, FrameSettings, ImageRegistration, Microscope, Microtome,
    SimulatedMicroscope, SimulatedMicrotome, SimulatedOptics,
};
use std::sync::Arc;

fn bench_correlation(c: &mut Criterion) {
    let stage = Arc::new(SimulatedMicrotome::new());
    let optics = SimulatedOptics {
        truth: StageCalibration::default(),
        ..Default::default()
    };
    let scope = SimulatedMicroscope::new(stage.clone(), optics, 1);
    let settings = FrameSettings::default();
    let reference = scope.acquire_frame(&settings).unwrap();
    stage.move_to_xy(XyPosition::new(1.6, 0.4)).unwrap();
    let shifted = scope.acquire_frame(&settings).unwrap();

    let registration = CorrelationRegistration::default();
    c.bench_function("correlation_96px_r24", |b| {
        b.iter(|| registration.shift(black_box(&reference), black_box(&shifted)))
    });
}

criterion_group!(benches, bench_correlation);
criterion_main!(benches);
