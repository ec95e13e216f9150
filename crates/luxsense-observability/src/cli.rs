// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-luxsense-sensors` to raise one crate to
//! debug level while everything else stays at the default level.

use std::collections::HashSet;
use std::env;

use crate::{DEBUG_ENV, KNOWN_CRATES};

/// Per-crate debug switches
///
/// # Example
/// ```rust
/// use luxsense_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-luxsense-compute".to_string()]);
/// assert!(flags.is_enabled("luxsense-compute"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashSet<String>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`; `--debug-all`
    /// enables every crate in [`KNOWN_CRATES`]. Other arguments are ignored.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Merge a `LUXSENSE_DEBUG`-style value: `all` or comma-separated crate names
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string());
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` if enabled, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build an `EnvFilter` directive string with `info` as the default level
    pub fn to_filter_string(&self) -> String {
        self.to_filter_string_with_default("info")
    }

    /// Build an `EnvFilter` directive string
    ///
    /// Tracing targets are module paths, so crate names are written with
    /// underscores: `luxsense-sensors` becomes `luxsense_sensors=debug`.
    /// Output is sorted so the same flags always produce the same filter.
    pub fn to_filter_string_with_default(&self, default_level: &str) -> String {
        let mut filters: Vec<String> = self
            .enabled_crates
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name.replace('-', "_")))
            .collect();
        filters.sort();
        filters.push(default_level.to_string());
        filters.join(",")
    }
}

/// Parse debug flags from process arguments and the `LUXSENSE_DEBUG` environment variable
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var(DEBUG_ENV) {
        flags.merge_env_value(&env_var);
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  {env}={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  {env}=all                               Enable debug for all crates

Examples:
  --debug-luxsense-sensors
  {env}=luxsense-compute,luxsense-sensors
"#,
        KNOWN_CRATES.join(", "),
        env = DEBUG_ENV
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec![
            "luxsense-demo".to_string(),
            "--debug-luxsense-sensors".to_string(),
        ]);
        assert!(flags.is_enabled("luxsense-sensors"));
        assert!(!flags.is_enabled("luxsense-compute"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_env_value_merge() {
        let mut flags = CrateDebugFlags::default();
        flags.merge_env_value(" luxsense-compute , ,luxsense-config");
        assert!(flags.is_enabled("luxsense-compute"));
        assert!(flags.is_enabled("luxsense-config"));
        assert_eq!(flags.enabled_crates.len(), 2);
    }

    #[test]
    fn test_filter_string_uses_module_targets() {
        let flags = CrateDebugFlags::from_args(vec![
            "--debug-luxsense-sensors".to_string(),
            "--debug-luxsense-compute".to_string(),
        ]);
        assert_eq!(
            flags.to_filter_string_with_default("warn"),
            "luxsense_compute=debug,luxsense_sensors=debug,warn"
        );
        assert_eq!(CrateDebugFlags::default().to_filter_string(), "info");
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-luxsense-sensors".to_string()]);
        assert_eq!(flags.log_level("luxsense-sensors"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("luxsense-compute"), tracing::Level::INFO);
    }

    #[test]
    fn test_help_lists_crates() {
        let help = debug_flags_help();
        assert!(help.contains("luxsense-sensors"));
        assert!(help.contains(DEBUG_ENV));
    }
}
