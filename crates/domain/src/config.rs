//! Configuration structures
//!
//! Deserialised from TOML/JSON files or assembled from environment variables
//! by `servertide_infra::config`. Every section has defaults except the
//! values that identify the deployment (calendar URL, identity label, token).

use std::fmt;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACTION_MAX_RETRIES, DEFAULT_ACTION_POLL_INTERVAL_MS,
    DEFAULT_CACHE_ERROR_TOLERANCE_FACTOR, DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_HCLOUD_API_URL,
    DEFAULT_INTERVAL_MINUTES, DEFAULT_LAG_MINUTES, DEFAULT_LEAD_MINUTES, DEFAULT_TICK_SECS,
    DEFAULT_TIMEZONE, DEFAULT_USER_DATA,
};
use crate::errors::{Result, ServerTideError};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    pub hcloud: HcloudConfig,
}

/// Where the calendar comes from and how long a fetched copy stays usable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub url: String,
    /// Directory holding `<identity>.cache`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    /// Oldest cache entry still served when the source is unreachable.
    /// Defaults to three times `max_age_seconds`.
    #[serde(default)]
    pub max_age_on_error_seconds: Option<u64>,
}

impl CalendarConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn max_age_on_error(&self) -> Duration {
        let secs = self
            .max_age_on_error_seconds
            .unwrap_or_else(|| {
                self.max_age_seconds.saturating_mul(DEFAULT_CACHE_ERROR_TOLERANCE_FACTOR)
            });
        Duration::from_secs(secs)
    }
}

/// Grid resolution and padding around calendar events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_lead")]
    pub lead_minutes: u32,
    #[serde(default = "default_lag")]
    pub lag_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            interval_minutes: default_interval(),
            lead_minutes: default_lead(),
            lag_minutes: default_lag(),
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured IANA timezone name.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            ServerTideError::Config(format!("Unknown timezone '{}': {e}", self.timezone))
        })
    }
}

/// Reconciliation loop cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_tick")]
    pub tick_seconds: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { tick_seconds: default_tick() }
    }
}

impl ReconcileConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

/// Hetzner Cloud resource driver settings
#[derive(Clone, Serialize, Deserialize)]
pub struct HcloudConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Value of the `token` label shared by the server, its snapshots,
    /// floating IP and SSH keys.
    pub identity: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub action_max_retries: u32,
    /// Server type used when neither the event nor the snapshot names one.
    #[serde(default)]
    pub default_server_type: Option<String>,
    #[serde(default = "default_user_data")]
    pub user_data: String,
}

impl HcloudConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl fmt::Debug for HcloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcloudConfig")
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("identity", &self.identity)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("action_max_retries", &self.action_max_retries)
            .field("default_server_type", &self.default_server_type)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reject configurations the scheduler cannot run with.
    ///
    /// # Errors
    /// Returns `ServerTideError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.calendar.url.trim().is_empty() {
            return Err(ServerTideError::Config("calendar.url must not be empty".into()));
        }
        if self.hcloud.identity.trim().is_empty() {
            return Err(ServerTideError::Config("hcloud.identity must not be empty".into()));
        }
        if self.hcloud.api_token.trim().is_empty() {
            return Err(ServerTideError::Config("hcloud.api_token must not be empty".into()));
        }

        let interval = self.schedule.interval_minutes;
        if interval == 0 || interval > 60 || 60 % interval != 0 {
            return Err(ServerTideError::Config(format!(
                "schedule.interval_minutes must divide 60, got {interval}"
            )));
        }
        self.schedule.tz()?;

        if self.reconcile.tick_seconds == 0 {
            return Err(ServerTideError::Config("reconcile.tick_seconds must be positive".into()));
        }
        if self.calendar.max_age_on_error() < self.calendar.max_age() {
            return Err(ServerTideError::Config(
                "calendar.max_age_on_error_seconds must not be below max_age_seconds".into(),
            ));
        }
        if self.hcloud.action_max_retries == 0 {
            return Err(ServerTideError::Config(
                "hcloud.action_max_retries must be positive".into(),
            ));
        }

        Ok(())
    }
}

fn default_cache_dir() -> String {
    ".".to_string()
}

fn default_max_age() -> u64 {
    DEFAULT_CACHE_MAX_AGE_SECS
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_lead() -> u32 {
    DEFAULT_LEAD_MINUTES
}

fn default_lag() -> u32 {
    DEFAULT_LAG_MINUTES
}

fn default_tick() -> u64 {
    DEFAULT_TICK_SECS
}

fn default_api_url() -> String {
    DEFAULT_HCLOUD_API_URL.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_ACTION_POLL_INTERVAL_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_ACTION_MAX_RETRIES
}

fn default_user_data() -> String {
    DEFAULT_USER_DATA.to_string()
}
