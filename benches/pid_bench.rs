use criterion::{criterion_group, criterion_main, Criterion};
use std::{
    hint::black_box,
    sync::{Arc, Mutex},
};

use flyback_regulator::regulator::{
    pid::{PidConfig, PidController},
    pwm::PwmActuator,
    sampler::FeedbackSampler,
    scheduler::ControlScheduler,
    setpoint::SetpointStore,
};
use flyback_regulator::utils::metrics::{EventRecorder, Metrics};

fn pid_update_bench(c: &mut Criterion) {
    let mut pid = PidController::new(PidConfig::new());

    c.bench_function("pid_update", |b| {
        b.iter(|| pid.update(black_box(1200), black_box(380)))
    });
}

fn control_tick_bench(c: &mut Criterion) {
    let sampler = Arc::new(FeedbackSampler::new());
    let setpoint = Arc::new(SetpointStore::new(1200));
    let pwm = Arc::new(PwmActuator::new());
    let metrics = Arc::new(Mutex::new(Metrics::default()));
    let recorder = Arc::new(EventRecorder::new());

    let mut scheduler = ControlScheduler::new(
        PidController::new(PidConfig::new()),
        sampler,
        setpoint,
        pwm,
        metrics,
        recorder,
    );

    c.bench_function("control_tick", |b| {
        b.iter(|| scheduler.on_timer_tick())
    });
}

criterion_group!(benches, pid_update_bench, control_tick_bench);
criterion_main!(benches);
