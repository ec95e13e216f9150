// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backend Selection Tests
//!
//! Covers the selection policy and the behaviour every backend must share:
//! - forced CPU never touches the GPU
//! - `Auto` always resolves to a concrete backend that can be built
//! - explicit GPU requests fail loudly instead of falling back
//! - platform/status strings are always populated

use luxsense_compute::backend::{create_gpu_backend, is_gpu_available};
use luxsense_compute::image::Rgba;
use luxsense_compute::{
    create_backend, platform_info, select_backend, support_status, BackendConfig, BackendType,
    DispatchConfig, Frame, SensorRegion,
};
use luxsense_config::{ComputeConfig, GpuBackendSet};

#[test]
fn test_auto_backend_is_always_constructible() {
    let config = BackendConfig::default();
    let decision = select_backend(&config);
    assert!(!decision.reason.is_empty());

    let backend = create_backend(&config).expect("auto selection must fall back to CPU");
    assert_eq!(backend.is_gpu(), decision.backend_type == BackendType::Wgpu);
    assert!(backend.is_available());
}

#[test]
fn test_explicit_gpu_request_does_not_fall_back() {
    let config = BackendConfig {
        backend_type: BackendType::Wgpu,
        gpu_backends: GpuBackendSet::Platform,
    };
    let decision = select_backend(&config);
    assert_eq!(decision.backend_type, BackendType::Wgpu);

    match create_backend(&config) {
        Ok(backend) => assert!(backend.is_gpu()),
        Err(_) => assert!(!decision.gpu_available),
    }
}

#[test]
fn test_gpu_backend_without_adapter_is_an_error() {
    if is_gpu_available(GpuBackendSet::Platform) {
        return;
    }
    assert!(create_gpu_backend(GpuBackendSet::Platform).is_err());
}

#[test]
fn test_default_compute_config_maps_to_auto() {
    let config = BackendConfig::from(&ComputeConfig::default());
    assert_eq!(config.backend_type, BackendType::Auto);
    assert_eq!(config.gpu_backends, GpuBackendSet::Platform);
}

#[test]
fn test_platform_strings() {
    assert!(!platform_info().is_empty());
    let status = support_status(GpuBackendSet::Platform);
    if is_gpu_available(GpuBackendSet::Platform) {
        assert_eq!(status, "GPU acceleration supported");
    } else {
        assert!(status.starts_with("CPU fallback"));
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_linux_platform_policy_is_cpu_only() {
    assert!(platform_info().starts_with("Linux - CPU only"));
    assert!(!is_gpu_available(GpuBackendSet::Platform));
    let decision = select_backend(&BackendConfig::default());
    assert_eq!(decision.backend_type, BackendType::Cpu);
}

#[test]
fn test_selected_backend_preserves_region_order() {
    let frame = Frame::from_fn(32, 32, |x, _| Rgba([x as f32 / 32.0, 0.0, 0.0, 1.0]));
    let regions = vec![
        SensorRegion::new(9, 28.0, 16.0, 2),
        SensorRegion::new(3, 4.0, 16.0, 2),
        SensorRegion::new(5, -50.0, 16.0, 2),
    ];

    let mut backend = create_backend(&BackendConfig::default()).unwrap();
    let results = backend
        .average_regions(&frame, &regions, &DispatchConfig::default())
        .unwrap();

    assert_eq!(results.len(), 3);
    let right = results[0].unwrap();
    let left = results[1].unwrap();
    assert!(right.r > left.r);
    assert!((right.r - 28.0 / 32.0).abs() < 1e-5);
    assert!(results[2].is_none());
}
