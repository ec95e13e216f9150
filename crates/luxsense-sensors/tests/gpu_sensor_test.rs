// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! GPU Sensor Tests
//!
//! Run only with `--features gpu`; every test returns early when this machine
//! has no usable adapter.

#![cfg(feature = "gpu")]

use luxsense_compute::backend::is_gpu_available;
use luxsense_compute::image::Rgba;
use luxsense_compute::{BackendConfig, BackendType, Frame};
use luxsense_config::GpuBackendSet;
use luxsense_sensors::BatchComputeEngine;

fn gpu_config() -> Option<BackendConfig> {
    if !is_gpu_available(GpuBackendSet::All) {
        eprintln!("No GPU adapter, skipping");
        return None;
    }
    Some(BackendConfig {
        backend_type: BackendType::Wgpu,
        gpu_backends: GpuBackendSet::All,
    })
}

#[test]
fn test_gpu_batch_matches_cpu_batch() {
    let Some(config) = gpu_config() else {
        return;
    };

    let frame = Frame::from_fn(256, 144, |x, y| {
        Rgba([x as f32 / 256.0, y as f32 / 144.0, ((x ^ y) & 31) as f32 / 31.0, 1.0])
    });

    let gpu = BatchComputeEngine::new(config);
    gpu.initialize().unwrap();
    assert!(gpu.is_using_gpu());

    let cpu = BatchComputeEngine::new(BackendConfig::cpu());
    cpu.initialize().unwrap();

    for id in 0..300u32 {
        let (x, y) = ((id * 37 % 270) as f32 - 7.0, (id * 11 % 160) as f32 - 8.0);
        gpu.add_sensor(id, x, y);
        cpu.add_sensor(id, x, y);
    }
    gpu.set_use_optimized_kernel(true);

    assert!(gpu.process_sensors(&frame));
    assert!(cpu.process_sensors(&frame));

    for ((id, g), (_, c)) in gpu.get_all_results_by_id().into_iter().zip(cpu.get_all_results_by_id()) {
        assert!((g.r - c.r).abs() < 1e-4, "sensor {id}: {g:?} vs {c:?}");
        assert!((g.g - c.g).abs() < 1e-4, "sensor {id}: {g:?} vs {c:?}");
        assert!((g.b - c.b).abs() < 1e-4, "sensor {id}: {g:?} vs {c:?}");
    }
}
