//! Race calendar source.
//!
//! Wire types for the remote race API plus the `RaceSource` trait the
//! discovery loop consumes. The production implementation is an HTTP
//! client; tests substitute static sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Bounded timeout for calendar requests.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

// ============================================================================
// Wire types
// ============================================================================

/// Top-level API response.
#[derive(Debug, Deserialize)]
struct RaceCalendar {
    #[serde(default)]
    races: Vec<Race>,
}

/// One event weekend as returned by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    /// Category this event belongs to (e.g. "f1").
    #[serde(default)]
    pub category_id: String,
    /// Human-readable event name; the API sometimes omits it.
    #[serde(default = "default_event_name")]
    pub complete_name: String,
    /// Sessions of the weekend, in calendar order.
    #[serde(default)]
    pub schedules: Vec<RaceSession>,
}

fn default_event_name() -> String {
    "Evento F1".to_string()
}

/// A single timed session within an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSession {
    /// Opaque stable identifier.
    #[serde(default)]
    pub id: String,
    /// Display name (e.g. "Clasificación"); the API sometimes omits it.
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Start instant, millisecond epoch.
    #[serde(default)]
    pub start_at: i64,
}

fn default_session_name() -> String {
    "Sesión".to_string()
}

impl RaceSession {
    /// Session start as an instant, if representable.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_at)
    }
}

// ============================================================================
// Source trait + errors
// ============================================================================

/// Errors from fetching the race calendar.
///
/// All of them degrade the same way: the discovery pass that hit the error
/// is abandoned and retried on the next interval.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API.
    #[error("API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Abstraction over "fetch the known sessions within a future window".
#[async_trait]
pub trait RaceSource: Send + Sync {
    /// Fetch all events whose sessions fall inside `[min, max]`.
    async fn fetch(&self, min: DateTime<Utc>, max: DateTime<Utc>) -> Result<Vec<Race>, FetchError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP-backed race source.
pub struct HttpRaceSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRaceSource {
    /// Create a new source against the given API endpoint.
    pub fn new(base_url: Url) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("gridwatch/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { client, base_url }
    }
}

#[async_trait]
impl RaceSource for HttpRaceSource {
    async fn fetch(&self, min: DateTime<Utc>, max: DateTime<Utc>) -> Result<Vec<Race>, FetchError> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("minDate", &min.timestamp_millis().to_string())
            .append_pair("maxDate", &max.timestamp_millis().to_string());

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.bytes().await?;
        let calendar: RaceCalendar = serde_json::from_slice(&body)?;
        Ok(calendar.races)
    }
}
