//! Application constants
//!
//! Defaults mirror the deployment the scheduler was first written for.

// Schedule grid
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";
pub const DEFAULT_INTERVAL_MINUTES: u32 = 15;
pub const DEFAULT_LEAD_MINUTES: u32 = 15;
pub const DEFAULT_LAG_MINUTES: u32 = 30;
pub const SECONDS_PER_DAY: i64 = 86_400;

// Calendar cache
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 60 * 60;
pub const DEFAULT_CACHE_ERROR_TOLERANCE_FACTOR: u64 = 3;
pub const CACHE_FILE_EXTENSION: &str = "cache";

// Reconciliation loop
pub const DEFAULT_TICK_SECS: u64 = 60;

// Hetzner Cloud
pub const DEFAULT_HCLOUD_API_URL: &str = "https://api.hetzner.cloud/v1";
pub const DEFAULT_ACTION_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_ACTION_MAX_RETRIES: u32 = 300;
pub const IDENTITY_LABEL_KEY: &str = "token";
pub const DEFAULT_USER_DATA: &str = "#cloud-config\nruncmd:\n- [touch, /root/POWER_ON]\n";

// Description key that selects the server variant for an event
pub const VARIANT_DESCRIPTION_KEY: &str = "server_type";
