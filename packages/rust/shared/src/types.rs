//! Core domain types for SiteDesk.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SiteDeskError};

/// Current format version for persisted index snapshots.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a best-effort call to an external collaborator.
///
/// Engines never fail on a transient external problem; they report
/// `Unavailable` and let the caller pick the degraded behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The collaborator produced a value.
    Available(T),
    /// The collaborator could not be reached, failed, or is not configured.
    Unavailable { reason: String },
}

impl<T> Outcome<T> {
    /// Build an `Unavailable` outcome from any displayable reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Convert into an `Option`, discarding the reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }

    /// Map the available value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Available(v) => Outcome::Available(f(v)),
            Self::Unavailable { reason } => Outcome::Unavailable { reason },
        }
    }

    /// The unavailability reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T: Default> Outcome<T> {
    /// The available value, or the type's neutral default.
    pub fn unwrap_or_default(self) -> T {
        self.ok().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Business profile
// ---------------------------------------------------------------------------

/// Calendar settings for the configured business.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessCalendar {
    /// IANA timezone all business-hours arithmetic happens in.
    pub timezone: Tz,
    /// First bookable hour of the day (inclusive).
    pub hours_start: u32,
    /// Hour at which booking closes (exclusive).
    pub hours_end: u32,
}

impl BusinessCalendar {
    /// Validate and build a calendar from an IANA zone id and hour bounds.
    pub fn new(timezone: &str, hours_start: u32, hours_end: u32) -> Result<Self> {
        let timezone: Tz = timezone.parse().map_err(|_| {
            SiteDeskError::validation(format!("unknown IANA timezone '{timezone}'"))
        })?;
        if hours_end > 24 || hours_start >= hours_end {
            return Err(SiteDeskError::validation(format!(
                "business hours {hours_start}..{hours_end} are not a valid range"
            )));
        }
        Ok(Self {
            timezone,
            hours_start,
            hours_end,
        })
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            hours_start: 9,
            hours_end: 17,
        }
    }
}

/// The one configured business. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessProfile {
    /// Stable identifier used to key the index snapshot.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Fixed company description injected into every grounding context.
    pub description: String,
    /// Root of the company website; defines the crawl domain.
    pub site_url: Url,
    pub calendar: BusinessCalendar,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// One indexed page: crawled content plus its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Absolute page URL with the fragment stripped.
    pub url: String,
    /// `<title>` text, or the URL when the page has none.
    pub title: String,
    /// Normalized visible text, bounded in length.
    pub text: String,
    /// Embedding of `text`. Empty when embedding failed.
    #[serde(default)]
    pub vector: Vec<f32>,
}

/// A ranked page returned to the conversation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageHit {
    pub url: String,
    pub title: String,
    pub text: String,
    /// Cosine similarity against the query, always > 0.
    pub score: f32,
}

/// Persisted form of a site index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Format version for forward compatibility.
    pub format_version: u32,
    pub business_id: String,
    /// Root URL the crawl started from.
    pub root_url: String,
    /// Identity of the embedding model that produced the vectors.
    pub embedding_model: String,
    /// Vector length, or 0 if no page could be embedded.
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    pub pages: Vec<PageRecord>,
}

impl IndexSnapshot {
    /// Build a snapshot, deriving `dimensions` from the first embedded page.
    pub fn new(
        business_id: impl Into<String>,
        root_url: impl Into<String>,
        embedding_model: impl Into<String>,
        pages: Vec<PageRecord>,
    ) -> Self {
        let dimensions = pages
            .iter()
            .map(|p| p.vector.len())
            .find(|len| *len > 0)
            .unwrap_or(0);
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            business_id: business_id.into(),
            root_url: root_url.into(),
            embedding_model: embedding_model.into(),
            dimensions,
            built_at: Utc::now(),
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_helpers() {
        let ok: Outcome<Vec<f32>> = Outcome::Available(vec![1.0]);
        assert!(ok.is_available());
        assert_eq!(ok.clone().unwrap_or_default(), vec![1.0]);

        let down: Outcome<Vec<f32>> = Outcome::unavailable("timeout");
        assert_eq!(down.reason(), Some("timeout"));
        assert!(down.unwrap_or_default().is_empty());
    }

    #[test]
    fn calendar_validation() {
        let cal = BusinessCalendar::new("Europe/Sofia", 9, 17).expect("valid calendar");
        assert_eq!(cal.timezone, chrono_tz::Europe::Sofia);

        assert!(BusinessCalendar::new("Mars/Olympus", 9, 17).is_err());
        assert!(BusinessCalendar::new("UTC", 17, 9).is_err());
        assert!(BusinessCalendar::new("UTC", 8, 25).is_err());
    }

    #[test]
    fn snapshot_dimensions_skip_unembedded_pages() {
        let pages = vec![
            PageRecord {
                url: "https://example.com/".into(),
                title: "Home".into(),
                text: "welcome".into(),
                vector: vec![],
            },
            PageRecord {
                url: "https://example.com/about".into(),
                title: "About".into(),
                text: "about us".into(),
                vector: vec![0.1, 0.2, 0.3],
            },
        ];
        let snap = IndexSnapshot::new("acme", "https://example.com/", "test-model", pages);
        assert_eq!(snap.dimensions, 3);
        assert_eq!(snap.format_version, SNAPSHOT_FORMAT_VERSION);

        let json = serde_json::to_string(&snap).expect("serialize");
        let parsed: IndexSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, snap);
    }
}
