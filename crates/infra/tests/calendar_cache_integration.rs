//! Integration tests for the calendar cache
//!
//! Runs the cache against a real HTTP source (wiremock) and a temporary
//! cache directory, ageing entries by rewriting their modification time.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use servertide_domain::ServerTideError;
use servertide_infra::calendar::{CachePolicy, CalendarCache, HttpCalendarFetcher};
use servertide_infra::http::HttpClient;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAX_AGE: Duration = Duration::from_secs(60);
const MAX_AGE_ON_ERROR: Duration = Duration::from_secs(180);

const REMOTE_BODY: &str =
    "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nX-WR-CALNAME:remote\r\nEND:VCALENDAR\r\n";
const CACHED_BODY: &str =
    "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nX-WR-CALNAME:cached\r\nEND:VCALENDAR\r\n";

fn cache(dir: &TempDir) -> CalendarCache {
    let http = HttpClient::builder()
        .max_attempts(1)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client");
    CalendarCache::new(
        Arc::new(HttpCalendarFetcher::new(http)),
        dir.path(),
        CachePolicy { max_age: MAX_AGE, max_age_on_error: MAX_AGE_ON_ERROR },
    )
}

fn write_entry(path: &Path, body: &str, age: Duration) -> SystemTime {
    std::fs::write(path, body).expect("write cache entry");
    let modified = SystemTime::now() - age;
    let file = std::fs::File::options().write(true).open(path).expect("open cache entry");
    file.set_modified(modified).expect("set mtime");
    modified
}

fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).and_then(|m| m.modified()).expect("cache entry mtime")
}

async fn serving(body: &str, expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/basic.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

async fn failing(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/basic.ics"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn expired_entry_is_refreshed_exactly_once() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = serving(REMOTE_BODY, 1).await;
    let url = format!("{}/basic.ics", server.uri());

    let entry = cache.entry_path("build-box");
    let before = write_entry(&entry, CACHED_BODY, MAX_AGE + Duration::from_secs(1));

    let document = cache.fetch(&url, "build-box").await.unwrap();
    assert_eq!(document.bytes(), REMOTE_BODY.as_bytes());
    assert!(mtime(&entry) > before);
    assert_eq!(std::fs::read_to_string(&entry).unwrap(), REMOTE_BODY);

    // The refreshed entry is fresh again: no second request.
    let again = cache.fetch(&url, "build-box").await.unwrap();
    assert_eq!(again.bytes(), REMOTE_BODY.as_bytes());
}

#[tokio::test]
async fn missing_entry_is_fetched_and_stored() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = serving(REMOTE_BODY, 1).await;
    let url = format!("{}/basic.ics", server.uri());

    cache.fetch(&url, "build-box").await.unwrap();

    let entry = cache.entry_path("build-box");
    assert_eq!(std::fs::read_to_string(entry).unwrap(), REMOTE_BODY);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn unreachable_source_serves_stale_entry_within_tolerance() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = failing(503).await;
    let url = format!("{}/basic.ics", server.uri());

    let entry = cache.entry_path("build-box");
    let before = write_entry(&entry, CACHED_BODY, MAX_AGE + Duration::from_secs(30));

    let document = cache.fetch(&url, "build-box").await.unwrap();
    assert_eq!(document.bytes(), CACHED_BODY.as_bytes());
    // Serving stale data must not make the entry look fresh.
    assert_eq!(mtime(&entry), before);
}

#[tokio::test]
async fn unreachable_source_beyond_tolerance_is_retrieval_error() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = failing(404).await;
    let url = format!("{}/basic.ics", server.uri());

    let too_old = MAX_AGE_ON_ERROR + Duration::from_secs(5);
    write_entry(&cache.entry_path("build-box"), CACHED_BODY, too_old);

    match cache.fetch(&url, "build-box").await {
        Err(ServerTideError::Retrieval(msg)) => assert!(msg.contains("old")),
        other => panic!("expected retrieval error, got {other:?}"),
    }
}

#[tokio::test]
async fn no_entry_and_unreachable_source_is_retrieval_error() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = failing(500).await;
    let url = format!("{}/basic.ics", server.uri());

    let err = cache.fetch(&url, "build-box").await.unwrap_err();
    assert!(matches!(err, ServerTideError::Retrieval(_)));
    assert!(!cache.entry_path("build-box").exists());
}

#[tokio::test]
async fn empty_key_bypasses_cache() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = serving(REMOTE_BODY, 2).await;
    let url = format!("{}/basic.ics", server.uri());

    cache.fetch(&url, "").await.unwrap();
    cache.fetch(&url, "").await.unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn separate_keys_use_separate_entries() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let server = serving(REMOTE_BODY, 2).await;
    let url = format!("{}/basic.ics", server.uri());

    cache.fetch(&url, "build-box").await.unwrap();
    cache.fetch(&url, "render-box").await.unwrap();
    cache.fetch(&url, "build-box").await.unwrap();

    assert!(cache.entry_path("build-box").exists());
    assert!(cache.entry_path("render-box").exists());
}
