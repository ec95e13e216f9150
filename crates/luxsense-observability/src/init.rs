// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Installs one global `tracing` subscriber: a console layer (text or JSON)
//! and, with the `file-logging` feature, a JSON file layer writing into a
//! timestamped run folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       └── luxsense.log
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logging options independent of where they were read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Level for every crate without a debug flag
    pub default_level: String,
    /// Emit console output as JSON lines
    pub json: bool,
    /// Base directory for file logs; `None` disables file output
    pub log_dir: Option<PathBuf>,
    /// Number of most recent run folders to keep
    pub retention_runs: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            json: false,
            log_dir: None,
            retention_runs: 10,
        }
    }
}

/// Keeps background log writers alive; logs are flushed when dropped
#[derive(Default)]
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving file logs, if file logging is active
    pub fn log_dir(&self) -> Option<&std::path::Path> {
        self.log_dir.as_deref()
    }
}

/// Build the filter directive for the given flags and options
pub fn filter_directive(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> String {
    debug_flags.to_filter_string_with_default(&options.default_level)
}

/// Initialize the global subscriber
///
/// # Errors
///
/// Fails if the filter directive is malformed, a log folder cannot be
/// created, or a global subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let filter = filter_directive(debug_flags, options);
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LoggingGuard::default();

    let console_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;
    let console_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(console_filter)
            .boxed()
    };
    layers.push(console_layer);

    if let Some(base_dir) = &options.log_dir {
        add_file_layer(&mut layers, &mut guard, base_dir, &filter, options.retention_runs)?;
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

/// Initialize logging with default options and flags from args/environment
pub fn init_logging_default() -> Result<LoggingGuard> {
    init_logging(&crate::cli::parse_debug_flags(), &LoggingOptions::default())
}

#[cfg(feature = "file-logging")]
fn add_file_layer(
    layers: &mut Vec<BoxedLayer>,
    guard: &mut LoggingGuard,
    base_dir: &std::path::Path,
    filter: &str,
    retention_runs: usize,
) -> Result<()> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_runs(base_dir, retention_runs)?;

    let appender = tracing_appender::rolling::never(&run_folder, "luxsense.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
    let file_filter =
        EnvFilter::try_new(filter).with_context(|| format!("Invalid log filter: {}", filter))?;

    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(file_filter)
            .boxed(),
    );

    guard._file_guards.push(file_guard);
    guard.log_dir = Some(run_folder);
    Ok(())
}

#[cfg(not(feature = "file-logging"))]
fn add_file_layer(
    _layers: &mut Vec<BoxedLayer>,
    _guard: &mut LoggingGuard,
    base_dir: &std::path::Path,
    _filter: &str,
    _retention_runs: usize,
) -> Result<()> {
    anyhow::bail!(
        "File logging to {} requested but the `file-logging` feature is disabled",
        base_dir.display()
    )
}

/// Remove all but the `keep` most recent `run_*` folders
///
/// Folder names embed a sortable timestamp, so name order is age order.
#[cfg(feature = "file-logging")]
pub fn cleanup_old_runs(base_dir: &std::path::Path, keep: usize) -> Result<()> {
    if !base_dir.exists() {
        return Ok(());
    }

    let mut runs: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(base_dir)? {
        let path = entry?.path();
        let is_run = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("run_"))
            .unwrap_or(false);
        if path.is_dir() && is_run {
            runs.push(path);
        }
    }
    runs.sort();

    let excess = runs.len().saturating_sub(keep.max(1));
    for path in runs.iter().take(excess) {
        if let Err(e) = std::fs::remove_dir_all(path) {
            eprintln!("Warning: Failed to remove old log directory {}: {}", path.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_uses_default_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-luxsense-compute".to_string()]);
        let options = LoggingOptions {
            default_level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(filter_directive(&flags, &options), "luxsense_compute=debug,warn");
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let options = LoggingOptions {
            default_level: "luxsense=verbose".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&CrateDebugFlags::default(), &options).is_err());
    }

    #[cfg(feature = "file-logging")]
    #[test]
    fn test_cleanup_keeps_most_recent_runs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["run_20250101_000000", "run_20250102_000000", "run_20250103_000000"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();

        cleanup_old_runs(dir.path(), 2).unwrap();

        assert!(!dir.path().join("run_20250101_000000").exists());
        assert!(dir.path().join("run_20250102_000000").exists());
        assert!(dir.path().join("run_20250103_000000").exists());
        assert!(dir.path().join("unrelated").exists());
    }
}
