//! Application context - dependency wiring for the binary

use std::sync::Arc;

use servertide_core::{GridSettings, ReconcileService};
use servertide_domain::{Config, Result};
use servertide_infra::calendar::{
    url_fingerprint, CachePolicy, CachedCalendarSource, CalendarCache, HttpCalendarFetcher,
};
use servertide_infra::http::HttpClient;
use servertide_infra::scheduling::{ReconcileScheduler, ReconcileSchedulerConfig};
use servertide_infra::HcloudDriver;
use tracing::info;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub driver: Arc<HcloudDriver>,
    pub service: Arc<ReconcileService>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let settings = GridSettings::from_config(&config.schedule)?;

        let calendar_http = HttpClient::new()?;
        let cache = CalendarCache::new(
            Arc::new(HttpCalendarFetcher::new(calendar_http)),
            &config.calendar.cache_dir,
            CachePolicy::from_config(&config.calendar),
        );
        let calendar = Arc::new(CachedCalendarSource::new(
            cache,
            &config.calendar.url,
            &config.hcloud.identity,
        ));

        let driver = Arc::new(HcloudDriver::from_config(&config.hcloud)?);
        let service = Arc::new(ReconcileService::new(
            calendar,
            driver.clone(),
            settings,
            &config.hcloud.identity,
        ));

        info!(
            identity = %config.hcloud.identity,
            calendar = %url_fingerprint(&config.calendar.url),
            timezone = %config.schedule.timezone,
            interval_minutes = config.schedule.interval_minutes,
            "application context ready"
        );

        Ok(Self { config, driver, service })
    }

    pub fn identity(&self) -> &str {
        &self.config.hcloud.identity
    }

    pub fn scheduler(&self) -> ReconcileScheduler {
        ReconcileScheduler::new(
            Arc::clone(&self.service),
            ReconcileSchedulerConfig::from(&self.config.reconcile),
        )
    }
}
