//! Remote calendar download

use async_trait::async_trait;
use reqwest::Method;
use servertide_domain::{Result, ServerTideError};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::errors::status_error;
use crate::http::HttpClient;

const FINGERPRINT_SALT: &str = "servertide:calendar-url:";

/// Short, stable stand-in for a calendar URL in logs.
///
/// Shared calendar links usually embed a private token, so the URL itself is
/// never logged.
pub fn url_fingerprint(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_SALT.as_bytes());
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("cal_{}", &digest[..12])
}

/// Downloads calendar bytes from a URL.
#[async_trait]
pub trait CalendarFetcher: Send + Sync {
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP(S) GET, retried by the [`HttpClient`].
#[derive(Clone)]
pub struct HttpCalendarFetcher {
    client: HttpClient,
}

impl HttpCalendarFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CalendarFetcher for HttpCalendarFetcher {
    #[instrument(skip(self, url), fields(calendar = %url_fingerprint(url)))]
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.send(self.client.request(Method::GET, url)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, "calendar download failed"));
        }

        let bytes = response.bytes().await.map_err(|e| {
            ServerTideError::Network(format!("calendar download interrupted: {e}"))
        })?;
        debug!(bytes = bytes.len(), "downloaded calendar");
        Ok(bytes.to_vec())
    }
}
