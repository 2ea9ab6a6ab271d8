//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. An explicit path (`--config`) is always read as a file
//! 2. Otherwise, attempts to load from environment variables
//! 3. If the required variables are missing, falls back to a discovered file
//! 4. `SERVERTIDE_HCLOUD_TOKEN` overrides the token from any file
//! 5. The result is validated before it is returned
//!
//! ## Environment Variables
//! Required:
//! - `SERVERTIDE_CALENDAR_URL`: iCalendar URL
//! - `SERVERTIDE_IDENTITY`: label shared by the server and its snapshots
//! - `SERVERTIDE_HCLOUD_TOKEN`: Hetzner Cloud API token
//!
//! Optional (defaults in `servertide_domain::constants`):
//! - `SERVERTIDE_CACHE_DIR`, `SERVERTIDE_CACHE_MAX_AGE`,
//!   `SERVERTIDE_CACHE_MAX_AGE_ON_ERROR` (seconds)
//! - `SERVERTIDE_TIMEZONE`, `SERVERTIDE_INTERVAL_MINUTES`,
//!   `SERVERTIDE_LEAD_MINUTES`, `SERVERTIDE_LAG_MINUTES`
//! - `SERVERTIDE_TICK_SECONDS`
//! - `SERVERTIDE_HCLOUD_API_URL`, `SERVERTIDE_HCLOUD_POLL_INTERVAL_MS`,
//!   `SERVERTIDE_HCLOUD_ACTION_MAX_RETRIES`, `SERVERTIDE_DEFAULT_SERVER_TYPE`,
//!   `SERVERTIDE_USER_DATA`
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./servertide.toml`, `./servertide.json`, `./config.toml`,
//!    `./config.json` (current working directory)
//! 2. The same names in the parent and grandparent directory
//! 3. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use servertide_domain::constants::{
    DEFAULT_ACTION_MAX_RETRIES, DEFAULT_ACTION_POLL_INTERVAL_MS, DEFAULT_CACHE_MAX_AGE_SECS,
    DEFAULT_HCLOUD_API_URL, DEFAULT_INTERVAL_MINUTES, DEFAULT_LAG_MINUTES, DEFAULT_LEAD_MINUTES,
    DEFAULT_TICK_SECS, DEFAULT_TIMEZONE, DEFAULT_USER_DATA,
};
use servertide_domain::{
    CalendarConfig, Config, HcloudConfig, ReconcileConfig, Result, ScheduleConfig,
    ServerTideError,
};

const TOKEN_VAR: &str = "SERVERTIDE_HCLOUD_TOKEN";
const CONFIG_FILE_NAMES: [&str; 4] =
    ["servertide.toml", "servertide.json", "config.toml", "config.json"];

/// Load and validate configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ServerTideError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded values fail validation
pub fn load(path: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_from_file(Some(path))?,
        None => match load_from_env() {
            Ok(config) => {
                tracing::info!("Configuration loaded from environment variables");
                config
            }
            Err(e) => {
                tracing::debug!(error = ?e, "Failed to load from environment, trying file");
                load_from_file(None)?
            }
        },
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// The three required variables must be present; everything else falls back
/// to its default.
///
/// # Errors
/// Returns `ServerTideError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let url = env_var("SERVERTIDE_CALENDAR_URL")?;
    let identity = env_var("SERVERTIDE_IDENTITY")?;
    let api_token = env_var(TOKEN_VAR)?;

    let max_age_seconds = env_parse("SERVERTIDE_CACHE_MAX_AGE", DEFAULT_CACHE_MAX_AGE_SECS)?;
    let max_age_on_error_seconds = match std::env::var("SERVERTIDE_CACHE_MAX_AGE_ON_ERROR") {
        Ok(value) => Some(parse_value("SERVERTIDE_CACHE_MAX_AGE_ON_ERROR", &value)?),
        Err(_) => None,
    };

    Ok(Config {
        calendar: CalendarConfig {
            url,
            cache_dir: env_or("SERVERTIDE_CACHE_DIR", "."),
            max_age_seconds,
            max_age_on_error_seconds,
        },
        schedule: ScheduleConfig {
            timezone: env_or("SERVERTIDE_TIMEZONE", DEFAULT_TIMEZONE),
            interval_minutes: env_parse("SERVERTIDE_INTERVAL_MINUTES", DEFAULT_INTERVAL_MINUTES)?,
            lead_minutes: env_parse("SERVERTIDE_LEAD_MINUTES", DEFAULT_LEAD_MINUTES)?,
            lag_minutes: env_parse("SERVERTIDE_LAG_MINUTES", DEFAULT_LAG_MINUTES)?,
        },
        reconcile: ReconcileConfig {
            tick_seconds: env_parse("SERVERTIDE_TICK_SECONDS", DEFAULT_TICK_SECS)?,
        },
        hcloud: HcloudConfig {
            api_token,
            api_url: env_or("SERVERTIDE_HCLOUD_API_URL", DEFAULT_HCLOUD_API_URL),
            identity,
            poll_interval_ms: env_parse(
                "SERVERTIDE_HCLOUD_POLL_INTERVAL_MS",
                DEFAULT_ACTION_POLL_INTERVAL_MS,
            )?,
            action_max_retries: env_parse(
                "SERVERTIDE_HCLOUD_ACTION_MAX_RETRIES",
                DEFAULT_ACTION_MAX_RETRIES,
            )?,
            default_server_type: std::env::var("SERVERTIDE_DEFAULT_SERVER_TYPE")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            user_data: env_or("SERVERTIDE_USER_DATA", DEFAULT_USER_DATA),
        },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ServerTideError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ServerTideError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => search_config_paths().ok_or_else(|| {
            ServerTideError::Config(
                "No config file found and SERVERTIDE_* environment incomplete".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ServerTideError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ServerTideError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ServerTideError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ServerTideError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Search multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn search_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.extend([exe_dir.to_path_buf(), exe_dir.join("..")]);
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Environment values that win over file contents
fn apply_env_overrides(config: &mut Config) {
    if let Ok(token) = std::env::var(TOKEN_VAR) {
        if !token.trim().is_empty() {
            config.hcloud.api_token = token;
        }
    }
}

/// Get required environment variable
///
/// # Errors
/// Returns `ServerTideError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ServerTideError::Config(format!("Missing required environment variable: {}", key))
        })
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => parse_value(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ServerTideError::Config(format!("Invalid value for {}: {}", key, e)))
}
