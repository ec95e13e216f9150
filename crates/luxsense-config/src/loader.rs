// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{clamp_to_bounds, validate_config, ConfigError, ConfigResult, LuxsenseConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in the working directory and its parents
pub const CONFIG_FILE_NAME: &str = "luxsense.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "LUXSENSE_CONFIG_PATH";

/// Override keys understood by both the environment and CLI layers.
///
/// The environment variable for a key is `LUXSENSE_` + the key upper-cased,
/// e.g. `sample_radius` -> `LUXSENSE_SAMPLE_RADIUS`.
pub const OVERRIDE_KEYS: &[&str] = &[
    "backend",
    "gpu_backends",
    "max_sensors",
    "sample_radius",
    "use_optimized_kernel",
    "sensors_per_thread",
    "poll_hz",
    "auto_update_screen_positions",
    "use_gpu_acceleration",
    "sensor_poll_hz",
    "cpu_frame_skip_interval",
    "log_level",
];

/// Find the luxsense configuration file
///
/// Search order:
/// 1. `LUXSENSE_CONFIG_PATH` environment variable
/// 2. Current working directory: `./luxsense.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by {} not found: {}",
                CONFIG_PATH_ENV,
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "luxsense configuration file '{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides (keys from [`OVERRIDE_KEYS`])
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or holds a
/// value that cannot be clamped (NaN or infinite rates)
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LuxsenseConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: LuxsenseConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    clamp_to_bounds(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Apply `LUXSENSE_*` environment variable overrides to configuration
pub fn apply_environment_overrides(config: &mut LuxsenseConfig) {
    for key in OVERRIDE_KEYS {
        if let Ok(value) = env::var(format!("LUXSENSE_{}", key.to_uppercase())) {
            apply_override(config, key, &value);
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"sample_radius": "6", "backend": "cpu"}`)
pub fn apply_cli_overrides(config: &mut LuxsenseConfig, cli_args: &HashMap<String, String>) {
    for (key, value) in cli_args {
        apply_override(config, key, value);
    }
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply a single override. Unknown keys and unparsable values are ignored.
fn apply_override(config: &mut LuxsenseConfig, key: &str, value: &str) {
    match key {
        "backend" => {
            if let Ok(backend) = value.parse() {
                config.compute.backend = backend;
            }
        }
        "gpu_backends" => match value.to_lowercase().as_str() {
            "platform" => config.compute.gpu_backends = crate::GpuBackendSet::Platform,
            "all" => config.compute.gpu_backends = crate::GpuBackendSet::All,
            _ => {}
        },
        "max_sensors" => {
            if let Ok(max) = value.parse::<usize>() {
                config.batch.max_sensors = max;
            }
        }
        "sample_radius" => {
            if let Ok(radius) = value.parse::<i32>() {
                config.batch.sample_radius = radius;
            }
        }
        "use_optimized_kernel" => config.batch.use_optimized_kernel = parse_bool(value),
        "sensors_per_thread" => {
            if let Ok(count) = value.parse::<u32>() {
                config.batch.sensors_per_thread = count;
            }
        }
        "poll_hz" => {
            if let Ok(hz) = value.parse::<f64>() {
                config.registry.poll_hz = hz;
            }
        }
        "auto_update_screen_positions" => {
            config.registry.auto_update_screen_positions = parse_bool(value)
        }
        "use_gpu_acceleration" => config.registry.use_gpu_acceleration = parse_bool(value),
        "sensor_poll_hz" => {
            if let Ok(hz) = value.parse::<f64>() {
                config.sensor.poll_hz = hz;
            }
        }
        "cpu_frame_skip_interval" => {
            if let Ok(interval) = value.parse::<u32>() {
                config.sensor.cpu_frame_skip_interval = interval;
            }
        }
        "log_level" => config.logging.level = value.to_string(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendPreference, GpuBackendSet};
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var(CONFIG_PATH_ENV, "/definitely/not/here/luxsense.toml");
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[batch]").unwrap();
        writeln!(file, "max_sensors = 64").unwrap();
        writeln!(file, "use_optimized_kernel = true").unwrap();
        writeln!(file, "[compute]").unwrap();
        writeln!(file, "gpu_backends = \"all\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.batch.max_sensors, 64);
        assert!(config.batch.use_optimized_kernel);
        assert_eq!(config.compute.gpu_backends, GpuBackendSet::All);
        assert_eq!(config.batch.sample_radius, 4);
    }

    #[test]
    fn test_load_clamps_out_of_range_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &config_path,
            "[batch]\nmax_sensors = 0\nsample_radius = -2\n\n[registry]\npoll_hz = 0\n\n[sensor]\npoll_hz = -5.0\n",
        )
        .unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.batch.max_sensors, 1);
        assert_eq!(config.batch.sample_radius, 1);
        assert_eq!(config.registry.poll_hz, 1.0);
        assert_eq!(config.sensor.poll_hz, 1.0);
    }

    #[test]
    fn test_load_rejects_unclampable_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[registry]\npoll_hz = nan\n").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = LuxsenseConfig::default();

        env::set_var("LUXSENSE_SAMPLE_RADIUS", "7");
        env::set_var("LUXSENSE_BACKEND", "cpu");
        env::set_var("LUXSENSE_MAX_SENSORS", "not-a-number");
        apply_environment_overrides(&mut config);
        env::remove_var("LUXSENSE_SAMPLE_RADIUS");
        env::remove_var("LUXSENSE_BACKEND");
        env::remove_var("LUXSENSE_MAX_SENSORS");

        assert_eq!(config.batch.sample_radius, 7);
        assert_eq!(config.compute.backend, BackendPreference::Cpu);
        assert_eq!(config.batch.max_sensors, 10_000);
    }

    #[test]
    fn test_cli_overrides_win_over_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[registry]\npoll_hz = 10.0\n").unwrap();

        let mut cli = HashMap::new();
        cli.insert("poll_hz".to_string(), "60".to_string());
        cli.insert("use_gpu_acceleration".to_string(), "no".to_string());
        cli.insert("unknown_key".to_string(), "ignored".to_string());

        let config = load_config(Some(&config_path), Some(&cli)).unwrap();
        assert_eq!(config.registry.poll_hz, 60.0);
        assert!(!config.registry.use_gpu_acceleration);
    }
}
