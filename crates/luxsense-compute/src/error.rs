// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised by compute backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("Compute backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("GPU device error: {0}")]
    DeviceError(String),

    #[error("Dispatch failed: {0}")]
    DispatchError(String),

    #[error("Readback failed: {0}")]
    ReadbackError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ComputeError>;
