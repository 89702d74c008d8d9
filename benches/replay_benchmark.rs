//! # Replay Benchmarks
//!
//! Cost of one prediction pass on the shift fast path, the settled-skip path
//! and a full replay.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use predict_core::*;

struct Walk;

impl Simulator for Walk {
    fn simulate(&mut self, step: &StepInput<'_>, _touches: &mut TouchList) -> PredictedState {
        let mut next = *step.state();
        next.velocity = step.command.input().movement();
        next.origin += next.velocity * step.delta_time;
        next
    }
}

const SECONDARIES: u32 = 16;
const WINDOWS: [u32; 3] = [8, 32, 64];

fn walking(sequence: u32) -> Command {
    Command::new(
        sequence,
        UserInput {
            forward_move: 320.0,
            side_move: if sequence % 2 == 0 { 50.0 } else { -50.0 },
            ..Default::default()
        },
    )
}

/// Engine with a primary, extra objects and `in_flight` predicted commands
fn primed_engine(config: PredictionConfig, in_flight: u32) -> PredictionEngine {
    let mut engine = PredictionEngine::new(config).unwrap();
    engine
        .register(PredictableObject::primary(NetworkId(0), PredictedState::default()))
        .unwrap();
    for id in 1..=SECONDARIES {
        engine
            .register(PredictableObject::secondary(NetworkId(id), PredictedState::at(Vec3::splat(id as f32))))
            .unwrap();
    }
    for seq in 1..=in_flight {
        engine.record_command(walking(seq)).unwrap();
    }
    engine.update(&mut Walk, &FrameRequest::new(1, 0, in_flight)).unwrap();
    engine
}

/// World snapshot agreeing with every object's prediction for command 1
fn agreeing_snapshot(engine: &PredictionEngine) -> WorldSnapshot {
    let ctx = engine.context();
    let mut snapshot = WorldSnapshot::new(2, 0.1);
    for handle in ctx.registry().ordered() {
        let object = ctx.registry().get(handle).unwrap();
        let predicted = ctx.snapshots().get(handle, 0).copied().unwrap_or_default();
        snapshot = snapshot.with(object.network_id().unwrap(), predicted);
    }
    snapshot
}

fn bench_full_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_replay");
    let config = PredictionConfig {
        optimize: OptimizeLevel::Off,
        ..Default::default()
    };

    for in_flight in WINDOWS.iter() {
        group.throughput(Throughput::Elements(*in_flight as u64));
        group.bench_with_input(BenchmarkId::from_parameter(in_flight), in_flight, |b, &in_flight| {
            let mut engine = primed_engine(config.clone(), in_flight);
            let request = FrameRequest::new(1, 0, in_flight);
            b.iter(|| {
                black_box(engine.update(&mut Walk, &request).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_path_shift");

    for in_flight in WINDOWS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(in_flight), in_flight, |b, &in_flight| {
            b.iter_batched(
                || {
                    let mut engine = primed_engine(PredictionConfig::default(), in_flight);
                    let snapshot = agreeing_snapshot(&engine);
                    engine.apply_snapshot(&snapshot).unwrap();
                    engine
                },
                |mut engine| {
                    black_box(engine.update(&mut Walk, &FrameRequest::new(2, 1, in_flight)).unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_continue(c: &mut Criterion) {
    let mut group = c.benchmark_group("continue_one_command");

    for in_flight in WINDOWS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(in_flight), in_flight, |b, &in_flight| {
            b.iter_batched(
                || {
                    let mut engine = primed_engine(PredictionConfig::default(), in_flight);
                    engine.record_command(walking(in_flight + 1)).unwrap();
                    engine
                },
                |mut engine| {
                    black_box(engine.update(&mut Walk, &FrameRequest::new(1, 0, in_flight + 1)).unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_replay, bench_fast_path, bench_continue);
criterion_main!(benches);
