//! File-backed calendar cache with bounded staleness
//!
//! One file per cache key (`<dir>/<key>.cache`); its modification time is the
//! retrieval time. Freshness policy:
//!
//! | cache entry                    | remote   | result            |
//! |--------------------------------|----------|-------------------|
//! | none                           | ok       | fetched, stored   |
//! | none                           | fails    | `Retrieval` error |
//! | age <= max_age                 | not used | cached            |
//! | age > max_age                  | ok       | fetched, stored   |
//! | max_age < age <= max_age_on_error | fails | cached (stale)    |
//! | age > max_age_on_error         | fails    | `Retrieval` error |
//!
//! An empty cache key disables caching entirely.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use servertide_common::{Clock, SystemClock};
use servertide_core::CalendarSource;
use servertide_domain::constants::CACHE_FILE_EXTENSION;
use servertide_domain::{CalendarConfig, CalendarDocument, Result, ServerTideError};
use tracing::{debug, info, instrument, warn};

use super::fetcher::{url_fingerprint, CalendarFetcher};
use crate::errors::InfraError;

/// How long a cached calendar may be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: Duration,
    pub max_age_on_error: Duration,
}

impl CachePolicy {
    pub fn from_config(config: &CalendarConfig) -> Self {
        Self { max_age: config.max_age(), max_age_on_error: config.max_age_on_error() }
    }
}

/// Calendar cache keyed by an arbitrary label (usually the server identity).
pub struct CalendarCache {
    fetcher: Arc<dyn CalendarFetcher>,
    dir: PathBuf,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl CalendarCache {
    pub fn new(
        fetcher: Arc<dyn CalendarFetcher>,
        dir: impl Into<PathBuf>,
        policy: CachePolicy,
    ) -> Self {
        Self { fetcher, dir: dir.into(), policy, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Location of the entry for `cache_key`.
    pub fn entry_path(&self, cache_key: &str) -> PathBuf {
        let file_name: String = cache_key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' }
            })
            .collect();
        self.dir.join(format!("{file_name}.{CACHE_FILE_EXTENSION}"))
    }

    /// Return the calendar at `url`, from cache when the policy allows.
    ///
    /// # Errors
    /// `ServerTideError::Retrieval` when the remote fetch fails and no cache
    /// entry is young enough to stand in for it.
    #[instrument(skip(self, url), fields(calendar = %url_fingerprint(url), key = cache_key))]
    pub async fn fetch(&self, url: &str, cache_key: &str) -> Result<CalendarDocument> {
        if cache_key.is_empty() {
            debug!("no cache key, fetching directly");
            let bytes = self.fetch_remote(url).await.map_err(retrieval_error)?;
            return Ok(CalendarDocument::new(bytes, self.clock.now()));
        }

        let path = self.entry_path(cache_key);
        let Some(modified) = modified_time(&path).await else {
            info!(path = %path.display(), "no cached calendar, fetching");
            return self.refresh(url, &path).await.map_err(retrieval_error);
        };

        let age = self.clock.system_time().duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= self.policy.max_age {
            match read_entry(&path, modified).await {
                Ok(document) => {
                    debug!(age_secs = age.as_secs(), "serving cached calendar");
                    return Ok(document);
                }
                Err(e) => {
                    warn!(error = %e, "cached calendar unreadable, treating as missing");
                    return self.refresh(url, &path).await.map_err(retrieval_error);
                }
            }
        }

        match self.refresh(url, &path).await {
            Ok(document) => Ok(document),
            Err(e) if age <= self.policy.max_age_on_error => {
                warn!(
                    error = %e,
                    age_secs = age.as_secs(),
                    "calendar source unreachable, serving stale cache"
                );
                read_entry(&path, modified).await.map_err(|read| {
                    ServerTideError::Retrieval(format!("{e}; stale cached copy unreadable: {read}"))
                })
            }
            Err(e) => {
                warn!(
                    error = %e,
                    age_secs = age.as_secs(),
                    "calendar source unreachable and cache too old"
                );
                Err(ServerTideError::Retrieval(format!(
                    "{e}; cached copy is {}s old (limit {}s)",
                    age.as_secs(),
                    self.policy.max_age_on_error.as_secs()
                )))
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        self.fetcher.fetch_remote(url).await
    }

    async fn refresh(&self, url: &str, path: &Path) -> Result<CalendarDocument> {
        let bytes = self.fetch_remote(url).await?;
        if let Err(e) = write_entry(path, &bytes).await {
            warn!(path = %path.display(), error = %e, "could not persist calendar cache");
        }
        info!(bytes = bytes.len(), "calendar refreshed");
        Ok(CalendarDocument::new(bytes, self.clock.now()))
    }
}

fn retrieval_error(error: ServerTideError) -> ServerTideError {
    match error {
        ServerTideError::Retrieval(_) => error,
        other => ServerTideError::Retrieval(format!("{other}; no cached copy available")),
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

fn io_error(error: std::io::Error) -> ServerTideError {
    InfraError::from(error).into()
}

async fn read_entry(path: &Path, modified: SystemTime) -> Result<CalendarDocument> {
    let bytes = tokio::fs::read(path).await.map_err(io_error)?;
    Ok(CalendarDocument::new(bytes, DateTime::<Utc>::from(modified)))
}

/// Write to a sibling temp file and rename, so readers never see a partial entry.
async fn write_entry(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let tmp = path.with_extension(format!("{CACHE_FILE_EXTENSION}.tmp"));
    tokio::fs::write(&tmp, bytes).await.map_err(io_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error)?;
    Ok(())
}

/// [`CalendarSource`] bound to one URL and cache key.
pub struct CachedCalendarSource {
    cache: CalendarCache,
    url: String,
    cache_key: String,
}

impl CachedCalendarSource {
    pub fn new(cache: CalendarCache, url: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self { cache, url: url.into(), cache_key: cache_key.into() }
    }

    pub fn cache(&self) -> &CalendarCache {
        &self.cache
    }
}

#[async_trait]
impl CalendarSource for CachedCalendarSource {
    async fn fetch_calendar(&self) -> Result<CalendarDocument> {
        self.cache.fetch(&self.url, &self.cache_key).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingFetcher {
        calls: AtomicUsize,
        body: Option<&'static str>,
    }

    #[async_trait]
    impl CalendarFetcher for CountingFetcher {
        async fn fetch_remote(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| ServerTideError::Network("connection refused".into()))
        }
    }

    fn cache(dir: &Path, body: Option<&'static str>) -> (CalendarCache, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher { calls: AtomicUsize::new(0), body });
        let policy = CachePolicy {
            max_age: Duration::from_secs(3600),
            max_age_on_error: Duration::from_secs(3 * 3600),
        };
        (CalendarCache::new(fetcher.clone(), dir, policy), fetcher)
    }

    #[test]
    fn entry_path_sanitizes_key() {
        let (cache, _) = cache(Path::new("/tmp/cache"), None);
        assert_eq!(cache.entry_path("build-box"), PathBuf::from("/tmp/cache/build-box.cache"));
        assert_eq!(
            cache.entry_path("../etc/passwd"),
            PathBuf::from("/tmp/cache/.._etc_passwd.cache")
        );
    }

    #[tokio::test]
    async fn empty_key_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, fetcher) = cache(dir.path(), Some("BEGIN:VCALENDAR"));

        cache.fetch("https://calendar.example/a.ics", "").await.unwrap();
        cache.fetch("https://calendar.example/a.ics", "").await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_entry_with_unreachable_source_is_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(dir.path(), None);

        let err = cache.fetch("https://calendar.example/a.ics", "build-box").await.unwrap_err();
        assert!(matches!(err, ServerTideError::Retrieval(_)));
    }

    #[tokio::test]
    async fn fresh_entry_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, fetcher) = cache(dir.path(), Some("remote"));
        std::fs::write(cache.entry_path("build-box"), "cached").unwrap();

        let document = cache.fetch("https://calendar.example/a.ics", "build-box").await.unwrap();

        assert_eq!(document.bytes(), b"cached");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_fresh_entry_with_unreachable_source_is_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, fetcher) = cache(dir.path(), None);
        std::fs::create_dir(cache.entry_path("build-box")).unwrap();

        let err = cache.fetch("https://calendar.example/a.ics", "build-box").await.unwrap_err();

        assert!(matches!(err, ServerTideError::Retrieval(_)), "got {err:?}");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreadable_fresh_entry_is_replaced_by_remote_copy() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, fetcher) = cache(dir.path(), Some("remote"));
        std::fs::create_dir(cache.entry_path("build-box")).unwrap();

        let document = cache.fetch("https://calendar.example/a.ics", "build-box").await.unwrap();

        assert_eq!(document.bytes(), b"remote");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
