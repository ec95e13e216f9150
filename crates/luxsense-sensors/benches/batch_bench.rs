// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Sensor Engine Benchmarks
//!
//! - `batch_pass`: one full `process_sensors` call for growing sensor counts
//! - `registry_tick`: a due tick including re-projection and fan-out
//! - `single_refresh`: one synchronous single-sensor sample

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use luxsense_compute::image::Rgba;
use luxsense_compute::{BackendConfig, Frame};
use luxsense_sensors::{BatchComputeEngine, LightSensor, SensorRegistry, Vec2, Vec3};

fn test_frame() -> Frame {
    Frame::from_fn(1280, 720, |x, y| {
        Rgba([x as f32 / 1280.0, y as f32 / 720.0, ((x ^ y) & 0xff) as f32 / 255.0, 1.0])
    })
}

fn bench_batch_pass(c: &mut Criterion) {
    let frame = test_frame();
    let mut group = c.benchmark_group("batch_pass");

    for count in [64u32, 1024, 10_000] {
        let engine = BatchComputeEngine::new(BackendConfig::default());
        engine.initialize().unwrap();
        for id in 0..count {
            engine.add_sensor(id, (id * 13 % 1280) as f32, (id * 7 % 720) as f32);
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("sensors", count), &engine, |b, engine| {
            b.iter(|| engine.process_sensors(black_box(&frame)))
        });
    }
    group.finish();
}

fn bench_registry_tick(c: &mut Criterion) {
    let registry = SensorRegistry::new();
    registry.initialize().unwrap();
    registry.set_projector(|w: Vec3| Some(Vec2::new(w.x, w.y)));
    registry.set_frame_source(test_frame());
    registry.set_poll_hz(100.0);
    for i in 0..1000u32 {
        registry
            .add_sensor(Vec3::new((i * 13 % 1280) as f32, (i * 7 % 720) as f32, 0.0), "")
            .unwrap();
    }
    registry.start_sampling();

    c.bench_function("registry_tick/1000", |b| b.iter(|| registry.tick(black_box(0.02))));
}

fn bench_single_refresh(c: &mut Criterion) {
    let frame = test_frame();
    let mut sensor = LightSensor::new();
    sensor.set_screen_sample_pos(Vec2::new(640.0, 360.0));
    c.bench_function("single_refresh", |b| b.iter(|| sensor.refresh(black_box(&frame))));
}

criterion_group!(benches, bench_batch_pass, bench_registry_tick, bench_single_refresh);
criterion_main!(benches);
