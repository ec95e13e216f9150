// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # luxsense - Screen-Space Light Sensors
//!
//! Virtual light sensors for rendered 3D scenes. Each sensor averages a small
//! window of the frame around its projected position and reports colour and
//! luminance. Many sensors are evaluated together in one compute pass, on the
//! GPU where the platform allows it and on the CPU otherwise.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! luxsense = "0.1"  # Default: sensors + config + observability
//! ```
//!
//! ## Feature Flags
//!
//! - **`sensors`** (default): single sensor, batch engine, registry
//! - **`config`** (default): TOML configuration with env/CLI overrides
//! - **`observability`** (default): logging initialisation and debug flags
//! - **`gpu`**: WGPU compute backend (Metal on macOS, DirectX 12 on Windows)
//! - **`file-logging`**: write JSON logs into timestamped run folders
//!
//! ## Usage
//!
//! ```rust,no_run
//! use luxsense::prelude::*;
//!
//! let config = luxsense::config::load_config(None, None)?;
//! let _logging = luxsense::init_logging_from_config(&config)?;
//!
//! let registry = SensorRegistry::from_config(&config);
//! registry.initialize()?;
//! registry.set_projector(|w: Vec3| Some(Vec2::new(w.x, w.y)));
//! registry.set_frame_source(|| None::<Frame>);
//!
//! let id = registry.add_sensor(Vec3::new(10.0, 20.0, 0.0), "window")?;
//! registry.start_sampling();
//! loop {
//!     registry.tick(1.0 / 60.0);
//!     let _color = registry.sensor_color(id);
//! #   break;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: luxsense-config, luxsense-observability    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Compute: luxsense-compute                              │
//! │  (averaging kernel, CPU and WGPU backends)              │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Sensors: luxsense-sensors                              │
//! │  (LightSensor, BatchComputeEngine, SensorRegistry)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export compute layer
pub use luxsense_compute as compute;

#[cfg(feature = "sensors")]
pub use luxsense_sensors as sensors;

#[cfg(feature = "config")]
pub use luxsense_config as config;

#[cfg(feature = "observability")]
pub use luxsense_observability as observability;

/// Initialise logging from the `[logging]` section plus `--debug-*` flags
///
/// Debug flags come from the process arguments and `LUXSENSE_DEBUG`. Keep
/// the returned guard alive for as long as logs should be written.
#[cfg(all(feature = "config", feature = "observability"))]
pub fn init_logging_from_config(
    config: &luxsense_config::LuxsenseConfig,
) -> anyhow::Result<luxsense_observability::LoggingGuard> {
    let flags = luxsense_observability::parse_debug_flags();
    luxsense_observability::init_logging(&flags, &logging_options(&config.logging))
}

/// Map the `[logging]` section onto logger options
#[cfg(all(feature = "config", feature = "observability"))]
pub fn logging_options(
    logging: &luxsense_config::LoggingConfig,
) -> luxsense_observability::LoggingOptions {
    luxsense_observability::LoggingOptions {
        default_level: logging.level.clone(),
        json: logging.format == luxsense_config::LogFormat::Json,
        ..Default::default()
    }
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::compute::{BackendConfig, BackendType, Color, ComputeBackend, Frame, SensorRegion};

    #[cfg(feature = "sensors")]
    pub use crate::sensors::{
        BatchComputeEngine, FrameSource, LightSensor, SensorEvent, SensorEventSink, SensorId,
        SensorInfo, SensorRegistry, Vec2, Vec3, WorldToScreen,
    };

    #[cfg(feature = "config")]
    pub use crate::config::{load_config, LuxsenseConfig};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        assert_eq!(Color::default(), Color::BLACK);
        let _ = BackendConfig::cpu();
    }

    #[cfg(all(feature = "config", feature = "observability"))]
    #[test]
    fn test_logging_options_follow_config() {
        let logging = crate::config::LoggingConfig {
            level: "debug".to_string(),
            format: crate::config::LogFormat::Json,
        };
        let options = crate::logging_options(&logging);
        assert_eq!(options.default_level, "debug");
        assert!(options.json);
        assert!(options.log_dir.is_none());
    }
}
