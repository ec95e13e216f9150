// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch Compute Engine Tests
//!
//! Observable behaviour of the region table and a full CPU pass:
//! - new sensors read BLACK until a pass covers them
//! - re-adding an id moves it instead of duplicating it
//! - averages are exact for known rasters, including clipped edges
//! - a window entirely off the frame keeps its previous colour
//! - exceeding the cap truncates and logs a warning

use luxsense_compute::image::Rgba;
use luxsense_compute::{BackendConfig, Color, Frame};
use luxsense_config::BatchConfig;
use luxsense_sensors::BatchComputeEngine;
use std::io::Write;
use std::sync::{Arc, Mutex};

fn cpu_engine() -> BatchComputeEngine {
    let engine = BatchComputeEngine::new(BackendConfig::cpu());
    engine.initialize().expect("CPU backend is always available");
    engine
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn test_new_sensor_reads_black() {
    let engine = cpu_engine();
    engine.add_sensor(1, 10.0, 10.0);
    assert_eq!(engine.get_sensor_result(1), Color::BLACK);
    assert_eq!(engine.get_all_results(), vec![Color::BLACK]);
    assert_eq!(engine.get_sensor_result(42), Color::BLACK);
}

#[test]
fn test_readding_moves_instead_of_duplicating() {
    let engine = cpu_engine();
    engine.add_sensor(5, 1.0, 1.0);
    engine.add_sensor(6, 2.0, 2.0);
    engine.add_sensor(5, 30.0, 40.0);

    assert_eq!(engine.get_sensor_count(), 2);
    assert_eq!(engine.region(5).unwrap().center(), (30.0, 40.0));
    let ids: Vec<u32> = engine.get_all_results_by_id().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![5, 6]);
}

#[test]
fn test_remove_and_clear() {
    let engine = cpu_engine();
    for id in 1..=3 {
        engine.add_sensor(id, 0.0, 0.0);
    }
    engine.remove_sensor(2);
    engine.remove_sensor(99);
    assert_eq!(engine.get_sensor_count(), 2);
    assert!(engine.region(2).is_none());
    assert_eq!(engine.get_all_results().len(), 2);

    engine.clear_all_sensors();
    assert_eq!(engine.get_sensor_count(), 0);
    assert!(engine.get_all_results().is_empty());
}

#[test]
fn test_pass_averages_each_region() {
    // Left half red, right half blue
    let frame = Frame::from_fn(64, 32, |x, _| {
        if x < 32 {
            Rgba([1.0, 0.0, 0.0, 1.0])
        } else {
            Rgba([0.0, 0.0, 1.0, 1.0])
        }
    });

    let engine = cpu_engine();
    engine.add_sensor(1, 10.0, 16.0);
    engine.add_sensor(2, 50.0, 16.0);
    // Straddles the boundary: columns 28..=36, four red and five blue
    engine.add_sensor(3, 32.0, 16.0);

    assert!(engine.process_sensors(&frame));
    assert_eq!(engine.get_sensor_result(1), Color::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(engine.get_sensor_result(2), Color::new(0.0, 0.0, 1.0, 1.0));

    let mixed = engine.get_sensor_result(3);
    assert!(approx(mixed.r, 4.0 / 9.0));
    assert!(approx(mixed.b, 5.0 / 9.0));
    assert_eq!(mixed.a, 1.0);
}

#[test]
fn test_corner_window_is_clipped() {
    // Red encodes the column index
    let frame = Frame::from_fn(20, 20, |x, _| Rgba([x as f32, 0.0, 0.0, 1.0]));
    let engine = cpu_engine();
    engine.add_sensor(1, 0.0, 0.0);

    assert!(engine.process_sensors(&frame));
    // Only columns 0..=4 are in bounds
    assert!(approx(engine.get_sensor_result(1).r, 2.0));
}

#[test]
fn test_off_frame_window_keeps_previous_colour() {
    let engine = cpu_engine();
    engine.add_sensor(1, 8.0, 8.0);

    let white = Frame::from_pixel(16, 16, Rgba([1.0, 1.0, 1.0, 1.0]));
    assert!(engine.process_sensors(&white));
    assert_eq!(engine.get_sensor_result(1), Color::new(1.0, 1.0, 1.0, 1.0));

    engine.add_sensor(1, -100.0, -100.0);
    let black = Frame::from_pixel(16, 16, Rgba([0.0, 0.0, 0.0, 1.0]));
    assert!(engine.process_sensors(&black));
    assert_eq!(engine.get_sensor_result(1), Color::new(1.0, 1.0, 1.0, 1.0));
}

#[test]
fn test_optimized_kernel_matches_plain_pass() {
    let frame = Frame::from_fn(96, 64, |x, y| {
        Rgba([(x % 11) as f32 / 10.0, (y % 7) as f32 / 6.0, ((x * y) % 5) as f32 / 4.0, 1.0])
    });

    let plain = cpu_engine();
    let packed = cpu_engine();
    packed.set_use_optimized_kernel(true);
    packed.set_sensors_per_thread(8);

    for id in 0..37u32 {
        let (x, y) = ((id * 17 % 96) as f32, (id * 5 % 64) as f32);
        plain.add_sensor(id, x, y);
        packed.add_sensor(id, x, y);
    }
    assert!(plain.process_sensors(&frame));
    assert!(packed.process_sensors(&frame));
    assert_eq!(plain.get_all_results(), packed.get_all_results());
}

#[test]
fn test_radius_from_config() {
    let config = BatchConfig {
        sample_radius: 1,
        ..BatchConfig::default()
    };
    let engine = BatchComputeEngine::from_config(&config, BackendConfig::cpu());
    engine.initialize().unwrap();

    // Radius 1: a 3x3 window on a column ramp averages to the centre column
    let frame = Frame::from_fn(10, 10, |x, _| Rgba([x as f32, 0.0, 0.0, 1.0]));
    engine.add_sensor(1, 0.0, 5.0);
    assert!(engine.process_sensors(&frame));
    assert!(approx(engine.get_sensor_result(1).r, 0.5));
}

/// Shared buffer the test subscriber writes into
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[test]
fn test_capacity_truncation_warns() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .finish();

    let engine = cpu_engine();
    engine.set_max_sensors(2);

    tracing::subscriber::with_default(subscriber, || {
        engine.add_sensor(1, 0.0, 0.0);
        engine.add_sensor(2, 0.0, 0.0);
        assert!(!logs.contents().contains("exceeds maximum"));
        engine.add_sensor(3, 0.0, 0.0);
    });

    assert_eq!(engine.get_sensor_count(), 2);
    assert!(engine.region(3).is_none());
    assert!(logs.contents().contains("Sensor count exceeds maximum, truncating"));
}

#[test]
fn test_lowering_cap_keeps_existing_regions() {
    let engine = cpu_engine();
    for id in 0..5 {
        engine.add_sensor(id, 0.0, 0.0);
    }
    engine.set_max_sensors(3);
    assert_eq!(engine.get_sensor_count(), 5);

    // Existing ids can still be moved without tripping the cap
    engine.add_sensor(4, 1.0, 1.0);
    assert_eq!(engine.get_sensor_count(), 5);

    engine.add_sensor(9, 0.0, 0.0);
    assert_eq!(engine.get_sensor_count(), 3);
}
