// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # luxsense-compute
//!
//! Pixel-averaging primitives and the compute backends that run them.
//!
//! A light sensor reads the mean colour of a small square window of the
//! rendered frame. This crate owns:
//! - [`Color`] and [`SensorRegion`], the data every backend exchanges
//! - [`kernel`], the reference CPU implementation of the averaging contract
//! - [`backend`], the [`ComputeBackend`] trait with a rayon CPU backend and a
//!   WGPU compute-shader backend (`gpu` feature)
//!
//! ## Example
//! ```rust
//! use luxsense_compute::{image::Rgba, kernel, Frame};
//!
//! let frame = Frame::from_pixel(32, 32, Rgba([0.5, 0.25, 1.0, 1.0]));
//! let color = kernel::average_region(&frame, (16.0, 16.0), 4).unwrap();
//! assert!((color.r - 0.5).abs() < 1e-6);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backend;
pub mod color;
pub mod error;
pub mod kernel;
pub mod region;

pub use backend::{
    create_backend, platform_info, select_backend, support_status, BackendConfig,
    BackendDecision, BackendType, ComputeBackend, CpuBackend, DispatchConfig,
};
#[cfg(feature = "gpu")]
pub use backend::WgpuBackend;
pub use color::Color;
pub use error::{ComputeError, Result};
pub use region::{SensorRegion, DEFAULT_SAMPLE_RADIUS, MAX_SAMPLE_RADIUS, MIN_SAMPLE_RADIUS};

/// Re-exported so hosts can build frames without naming the `image` crate
pub use image;

/// Pixel-addressable raster with normalised RGBA channels
pub type Frame = image::Rgba32FImage;
