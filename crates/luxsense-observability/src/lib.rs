// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # luxsense-observability
//!
//! Logging setup shared by every luxsense crate, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: additionally write JSON logs into a timestamped run folder

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known luxsense crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "luxsense",
    "luxsense-compute",
    "luxsense-sensors",
    "luxsense-config",
    "luxsense-observability",
];

/// Environment variable holding comma-separated crate names to debug (or `all`)
pub const DEBUG_ENV: &str = "LUXSENSE_DEBUG";
