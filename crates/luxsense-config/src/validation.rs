// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Out-of-range numbers are clamped to the nearest valid bound by
//! [`clamp_to_bounds`]. Only values that cannot be clamped into something
//! meaningful (NaN, infinities, an empty log filter) are rejected.

use crate::{ConfigError, ConfigResult, LuxsenseConfig};

/// Smallest and largest sample half-width in pixels
pub const SAMPLE_RADIUS_BOUNDS: (i32, i32) = (1, 16);

/// Regions per GPU invocation in the optimized kernel
pub const SENSORS_PER_THREAD_BOUNDS: (u32, u32) = (1, 16);

/// Poll rates in Hz
pub const POLL_HZ_BOUNDS: (f64, f64) = (1.0, 100.0);

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidRate { field: String, value: f64 },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRate { field, value } => {
                write!(f, "{} = {} must be a finite rate", field, value)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &LuxsenseConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// Pull every numeric setting into its valid range
///
/// Non-finite floats are left untouched so [`validate_config`] can report them.
pub fn clamp_to_bounds(config: &mut LuxsenseConfig) {
    let batch = &mut config.batch;
    batch.max_sensors = batch.max_sensors.max(1);
    batch.sample_radius = batch
        .sample_radius
        .clamp(SAMPLE_RADIUS_BOUNDS.0, SAMPLE_RADIUS_BOUNDS.1);
    batch.sensors_per_thread = batch
        .sensors_per_thread
        .clamp(SENSORS_PER_THREAD_BOUNDS.0, SENSORS_PER_THREAD_BOUNDS.1);

    for hz in [&mut config.registry.poll_hz, &mut config.sensor.poll_hz] {
        if hz.is_finite() {
            *hz = hz.clamp(POLL_HZ_BOUNDS.0, POLL_HZ_BOUNDS.1);
        }
    }

    let sensor = &mut config.sensor;
    sensor.cpu_frame_skip_interval = sensor.cpu_frame_skip_interval.max(1);
    sensor.worker_wait_timeout_ms = sensor.worker_wait_timeout_ms.max(1);
    if sensor.performance_target_ms.is_finite() {
        sensor.performance_target_ms = sensor.performance_target_ms.max(0.0);
    }
}

/// Collect all validation problems without failing fast
pub fn collect_errors(config: &LuxsenseConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("registry.poll_hz", config.registry.poll_hz),
        ("sensor.poll_hz", config.sensor.poll_hz),
    ] {
        if !value.is_finite() {
            errors.push(ConfigValidationError::InvalidRate {
                field: field.to_string(),
                value,
            });
        }
    }

    if !config.sensor.performance_target_ms.is_finite() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "sensor.performance_target_ms".to_string(),
            reason: "must be a finite duration".to_string(),
        });
    }

    if config.logging.level.trim().is_empty() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    errors
}
