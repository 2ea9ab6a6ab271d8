//! Calendar retrieval with a local freshness-bounded cache

pub mod cache;
pub mod fetcher;

pub use cache::{CachePolicy, CachedCalendarSource, CalendarCache};
pub use fetcher::{url_fingerprint, CalendarFetcher, HttpCalendarFetcher};
