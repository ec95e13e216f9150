// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use luxsense_compute::ComputeError;
use thiserror::Error;

/// Sensor engine errors
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor engine not initialized")]
    NotInitialized,

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Sensor capacity reached ({max} sensors)")]
    CapacityExceeded { max: usize },

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;
