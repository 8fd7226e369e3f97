//! Calendar readers: where busy intervals come from.
//!
//! The availability engine only sees the [`CalendarReader`] trait. Readers
//! report provider failures as [`Outcome::Unavailable`] and never write to
//! the calendar.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use sitedesk_shared::{AppConfig, Outcome, Result, SiteDeskError};

/// Formats accepted for zone-less timestamps.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// A timestamp as delivered by a calendar provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CalendarTime {
    /// A precise instant with an explicit offset.
    Instant(DateTime<FixedOffset>),
    /// A wall-clock time with no zone; read as business-local.
    Local(NaiveDateTime),
}

impl CalendarTime {
    /// Parse RFC 3339 as an instant; zone-less date-times and bare dates as local.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Instant(dt));
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::Local(naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Local(date.and_time(chrono::NaiveTime::MIN)));
        }
        Err(SiteDeskError::parse(format!("unrecognized calendar timestamp '{s}'")))
    }

    /// This timestamp in `tz`. Instants are converted; local times are
    /// interpreted in `tz` directly.
    pub fn in_zone(&self, tz: Tz) -> Option<DateTime<Tz>> {
        match self {
            Self::Instant(dt) => Some(dt.with_timezone(&tz)),
            Self::Local(naive) => resolve_local(tz, *naive),
        }
    }
}

impl TryFrom<String> for CalendarTime {
    type Error = SiteDeskError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

/// Map a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times inside
/// a DST gap move forward to the first valid minute after the gap.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=180).find_map(|minutes| {
            tz.from_local_datetime(&(naive + chrono::Duration::minutes(minutes)))
                .earliest()
        }),
    }
}

// ---------------------------------------------------------------------------
// Busy entries
// ---------------------------------------------------------------------------

/// One busy period as reported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusyEntry {
    pub start: CalendarTime,
    pub end: CalendarTime,
    #[serde(default)]
    pub label: String,
}

/// Parse a JSON array of `{start, end, label}` busy entries.
pub fn parse_busy_json(json: &str) -> Result<Vec<BusyEntry>> {
    serde_json::from_str(json)
        .map_err(|e| SiteDeskError::parse(format!("invalid busy-interval JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Supplies busy intervals overlapping a time range.
#[async_trait]
pub trait CalendarReader: Send + Sync {
    async fn busy_intervals(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Outcome<Vec<BusyEntry>>;
}

/// Fixed in-memory busy list.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    entries: Vec<BusyEntry>,
}

impl StaticCalendar {
    pub fn new(entries: Vec<BusyEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CalendarReader for StaticCalendar {
    async fn busy_intervals(
        &self,
        _range_start: DateTime<Utc>,
        _range_end: DateTime<Utc>,
    ) -> Outcome<Vec<BusyEntry>> {
        Outcome::Available(self.entries.clone())
    }
}

/// Busy list read from a local JSON file on every request.
#[derive(Debug, Clone)]
pub struct JsonFileCalendar {
    path: PathBuf,
}

impl JsonFileCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CalendarReader for JsonFileCalendar {
    async fn busy_intervals(
        &self,
        _range_start: DateTime<Utc>,
        _range_end: DateTime<Utc>,
    ) -> Outcome<Vec<BusyEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                let err = SiteDeskError::io(&self.path, e);
                warn!(error = %err, "busy file unreadable");
                return Outcome::unavailable(err.to_string());
            }
        };
        match parse_busy_json(&content) {
            Ok(entries) => Outcome::Available(entries),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "busy file malformed");
                Outcome::unavailable(e.to_string())
            }
        }
    }
}

/// HTTP busy feed: `GET {url}?start=..&end=..` returning a JSON busy list.
#[derive(Clone)]
pub struct JsonFeedCalendar {
    client: Client,
    url: String,
}

impl JsonFeedCalendar {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SiteDeskError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BusyEntry>> {
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let resp = self
            .client
            .get(&self.url)
            .query(&[("start", start.as_str()), ("end", end.as_str())])
            .send()
            .await
            .map_err(|e| SiteDeskError::Calendar(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SiteDeskError::Calendar(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SiteDeskError::Calendar(format!("body read failed: {e}")))?;
        parse_busy_json(&body)
    }
}

#[async_trait]
impl CalendarReader for JsonFeedCalendar {
    async fn busy_intervals(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Outcome<Vec<BusyEntry>> {
        match self.fetch(range_start, range_end).await {
            Ok(entries) => {
                debug!(entries = entries.len(), "fetched busy intervals");
                Outcome::Available(entries)
            }
            Err(e) => {
                warn!(error = %e, "busy feed request failed");
                Outcome::unavailable(e.to_string())
            }
        }
    }
}

/// Build the reader described by `[calendar]`, or `None` if none is configured.
///
/// A feed URL takes precedence over a busy file.
pub fn calendar_from_config(config: &AppConfig) -> Result<Option<Box<dyn CalendarReader>>> {
    let cal = &config.calendar;
    if let Some(url) = cal.busy_feed_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let reader = JsonFeedCalendar::new(url.trim(), Duration::from_secs(cal.timeout_secs))?;
        return Ok(Some(Box::new(reader)));
    }
    if let Some(path) = cal.busy_file.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(Some(Box::new(JsonFileCalendar::new(path.trim()))));
    }
    Ok(None)
}
