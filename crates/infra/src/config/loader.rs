//! Configuration loader
//!
//! Loads application configuration from a file and environment overrides.
//!
//! ## Loading Strategy
//! 1. An explicit path, then `SYNCLANE_CONFIG`, then the probed locations
//! 2. Built-in defaults when no file exists
//! 3. `SYNCLANE_*` environment variables override file values
//! 4. The merged result is validated
//!
//! ## Environment Variables
//! - `SYNCLANE_CONFIG`: Config file path
//! - `SYNCLANE_DB_PATH`: Database file path
//! - `SYNCLANE_DB_POOL_SIZE`: Connection pool size
//! - `SYNCLANE_LEASE_SECS`: Sync-cycle lease duration in seconds
//! - `SYNCLANE_RETRY_MAX_ATTEMPTS`: Attempts per cycle
//! - `SYNCLANE_RETRY_BASE_MS`: First retry delay in milliseconds
//! - `SYNCLANE_RETRY_MAX_DELAY_MS`: Retry delay cap in milliseconds
//! - `SYNCLANE_RETRY_MAX_ELAPSED_SECS`: Time window of one cycle in seconds
//! - `SYNCLANE_LOG_LEVEL`: Log filter (e.g. `info`, `synclane=debug`)
//! - `SYNCLANE_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./synclane.toml` or `./synclane.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use synclane_domain::{Config, Result, SyncLaneError};

const CONFIG_PATH_ENV: &str = "SYNCLANE_CONFIG";
const CONFIG_FILE_NAMES: [&str; 4] =
    ["synclane.toml", "synclane.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `SyncLaneError::Config` if:
/// - An explicitly named file does not exist
/// - File format is invalid
/// - An environment override has an invalid value
/// - The merged configuration fails validation
pub fn load(path: Option<PathBuf>) -> Result<Config> {
    let explicit = path.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    let config = match explicit {
        Some(path) => load_from_file(Some(path))?,
        None => match probe_config_paths() {
            Some(found) => load_from_file(Some(found))?,
            None => {
                tracing::debug!("no config file found; using defaults");
                Config::default()
            }
        },
    };

    let config = apply_env_overrides(config)?;
    config.validate()?;
    Ok(config)
}

/// Apply `SYNCLANE_*` environment overrides on top of `config`.
///
/// # Errors
/// Returns `SyncLaneError::Config` if a variable has an invalid value.
pub fn apply_env_overrides(config: Config) -> Result<Config> {
    apply_overrides_with(config, |key| std::env::var(key).ok())
}

fn apply_overrides_with(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    if let Some(path) = lookup("SYNCLANE_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = parse_var(&lookup, "SYNCLANE_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }
    if let Some(secs) = parse_var(&lookup, "SYNCLANE_LEASE_SECS")? {
        config.engine.lease_duration_secs = secs;
    }
    if let Some(attempts) = parse_var(&lookup, "SYNCLANE_RETRY_MAX_ATTEMPTS")? {
        config.retry.max_attempts = attempts;
    }
    if let Some(ms) = parse_var(&lookup, "SYNCLANE_RETRY_BASE_MS")? {
        config.retry.base_delay_ms = ms;
    }
    if let Some(ms) = parse_var(&lookup, "SYNCLANE_RETRY_MAX_DELAY_MS")? {
        config.retry.max_delay_ms = ms;
    }
    if let Some(secs) = parse_var(&lookup, "SYNCLANE_RETRY_MAX_ELAPSED_SECS")? {
        config.retry.max_elapsed_secs = secs;
    }
    if let Some(level) = lookup("SYNCLANE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("SYNCLANE_LOG_JSON") {
        config.logging.json = parse_bool(&json);
    }
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `SyncLaneError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SyncLaneError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SyncLaneError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SyncLaneError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SyncLaneError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SyncLaneError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SyncLaneError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                SyncLaneError::Config(format!("Invalid value for {key} ({raw:?}): {e}"))
            })
        })
        .transpose()
}

/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
