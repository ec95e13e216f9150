// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # luxsense-sensors
//!
//! Screen-space light sensors built on `luxsense-compute`.
//!
//! Three engines share one averaging contract:
//! - [`LightSensor`]: one sensor, sampled on a dedicated worker thread when a
//!   GPU backend exists and on the calling thread otherwise
//! - [`BatchComputeEngine`]: a table of regions averaged in one backend pass
//! - [`SensorRegistry`]: world-anchored sensors projected to screen space and
//!   fed through a batch engine on a fixed poll rate
//!
//! Hosts plug in through the traits in [`collaborators`]: a [`FrameSource`]
//! for the rendered frame, a [`WorldToScreen`] projector and a
//! [`SensorEventSink`] for notifications.
//!
//! ## Example
//! ```rust
//! use luxsense_sensors::{SensorRegistry, Vec3};
//! use luxsense_sensors::compute::{image::Rgba, BackendConfig, Frame};
//!
//! let registry = SensorRegistry::with_backend_config(BackendConfig::cpu());
//! registry.initialize().unwrap();
//! registry.set_frame_source(Frame::from_pixel(64, 64, Rgba([1.0, 0.0, 0.0, 1.0])));
//!
//! let id = registry.add_sensor(Vec3::new(0.0, 0.0, 0.0), "front").unwrap();
//! registry.update_sensor_screen_position(id, luxsense_sensors::Vec2::new(32.0, 32.0));
//! registry.force_update_all_sensors();
//! assert_eq!(registry.sensor_color(id).r, 1.0);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod batch;
pub mod collaborators;
pub mod error;
pub mod light_sensor;
pub mod registry;

pub use batch::BatchComputeEngine;
pub use collaborators::{
    FrameSource, NullSink, SensorEvent, SensorEventSink, Vec2, Vec3, WorldToScreen,
};
pub use error::{Result, SensorError};
pub use light_sensor::{LightData, LightSensor, SamplingStrategy};
pub use registry::{SensorId, SensorInfo, SensorRegistry};

/// Re-export of the compute layer
pub use luxsense_compute as compute;
pub use luxsense_compute::{Color, Frame};
