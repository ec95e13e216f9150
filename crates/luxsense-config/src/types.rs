// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `luxsense.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LuxsenseConfig {
    pub compute: ComputeConfig,
    pub batch: BatchConfig,
    pub registry: RegistryConfig,
    pub sensor: SensorConfig,
    pub logging: LoggingConfig,
}

/// Which compute backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when the platform has one, CPU otherwise
    #[default]
    Auto,
    Cpu,
    /// GPU only; engines stay unavailable if no adapter exists
    Gpu,
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPreference::Auto => write!(f, "auto"),
            BackendPreference::Cpu => write!(f, "cpu"),
            BackendPreference::Gpu => write!(f, "gpu"),
        }
    }
}

impl std::str::FromStr for BackendPreference {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "cpu" => Ok(BackendPreference::Cpu),
            "gpu" | "wgpu" => Ok(BackendPreference::Gpu),
            other => Err(crate::ConfigError::InvalidValue(format!(
                "unknown compute backend '{}'",
                other
            ))),
        }
    }
}

/// Which native GPU APIs may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackendSet {
    /// Metal on macOS, DirectX 12 on Windows, nothing elsewhere
    #[default]
    Platform,
    /// Any API wgpu supports (Vulkan, GL, ...)
    All,
}

/// Compute backend selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub backend: BackendPreference,
    pub gpu_backends: GpuBackendSet,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            gpu_backends: GpuBackendSet::Platform,
        }
    }
}

/// Batch compute engine tuning
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Soft cap on registered regions
    pub max_sensors: usize,
    /// Default sample half-width, clamped to [1, 16]
    pub sample_radius: i32,
    pub use_optimized_kernel: bool,
    /// Regions per GPU invocation in the optimized kernel, clamped to [1, 16]
    pub sensors_per_thread: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_sensors: 10_000,
            sample_radius: 4,
            use_optimized_kernel: false,
            sensors_per_thread: 4,
        }
    }
}

/// Sensor registry scheduling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub poll_hz: f64,
    pub auto_update_screen_positions: bool,
    pub use_gpu_acceleration: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_hz: 30.0,
            auto_update_screen_positions: true,
            use_gpu_acceleration: true,
        }
    }
}

/// Single light sensor behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub poll_hz: f64,
    /// Sample every Nth poll on the CPU fallback path (1 = every poll)
    pub cpu_frame_skip_interval: u32,
    /// Samples slower than this are reported at debug level
    pub performance_target_ms: f64,
    /// Upper bound on how long the worker sleeps between shutdown checks
    pub worker_wait_timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_hz: 30.0,
            cpu_frame_skip_interval: 1,
            performance_target_ms: 0.2,
            worker_wait_timeout_ms: 33,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
