//! Grounding for the conversation layer: query in, context out.
//!
//! A booking-intent query is answered from the availability engine, any
//! other query from the site index. Every collaborator failure degrades to
//! an `Unavailable` part; [`GroundingService::ground`] never fails.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use sitedesk_calendar::{
    AvailabilityEngine, CalendarReader, FreeWindow, calendar_from_config, render_windows,
};
use sitedesk_index::SiteIndex;
use sitedesk_shared::{AppConfig, BusinessProfile, Outcome, PageHit, Result};

use crate::intent::BookingIntent;

/// Reason reported when no calendar source is configured.
pub const NO_CALENDAR: &str = "no calendar configured";

/// Query-routing settings, taken from `[grounding]`, `[index]` and `[calendar]`.
#[derive(Debug, Clone)]
pub struct GroundingSettings {
    pub top_k: usize,
    pub default_days_ahead: u32,
    pub max_days_ahead: u32,
    pub booking_keywords: Vec<String>,
}

impl Default for GroundingSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GroundingSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.index.top_k,
            default_days_ahead: config.calendar.default_days_ahead,
            max_days_ahead: config.calendar.max_days_ahead,
            booking_keywords: config.grounding.booking_keywords.clone(),
        }
    }
}

/// Context handed back to the conversation layer for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Grounding {
    /// The business's fixed description.
    pub description: String,
    /// Relevant pages, best first. Empty for booking queries.
    pub pages: Outcome<Vec<PageHit>>,
    /// Free-slot summary, present only for booking queries.
    pub availability: Option<Outcome<String>>,
}

impl Grounding {
    pub fn is_booking(&self) -> bool {
        self.availability.is_some()
    }

    /// Plain-text context block for a system prompt.
    pub fn to_context(&self) -> String {
        let mut out = String::new();
        out.push_str(self.description.trim());
        out.push('\n');

        match &self.availability {
            Some(Outcome::Available(text)) => {
                out.push_str("\nFree booking slots:\n");
                out.push_str(text);
                out.push('\n');
            }
            Some(Outcome::Unavailable { reason }) => {
                out.push_str(&format!("\nBooking availability is unknown ({reason}).\n"));
            }
            None => {}
        }

        if let Outcome::Available(hits) = &self.pages {
            for hit in hits {
                out.push_str(&format!("\n[{}]({})\n{}\n", hit.title, hit.url, hit.text));
            }
        }
        out
    }
}

/// The single configured business, with its index and calendar.
pub struct GroundingService {
    profile: BusinessProfile,
    index: SiteIndex,
    calendar: Option<Box<dyn CalendarReader>>,
    engine: AvailabilityEngine,
    intent: BookingIntent,
    settings: GroundingSettings,
}

impl GroundingService {
    pub fn new(
        profile: BusinessProfile,
        index: SiteIndex,
        calendar: Option<Box<dyn CalendarReader>>,
        settings: GroundingSettings,
    ) -> Self {
        let engine = AvailabilityEngine::new(profile.calendar.clone(), settings.max_days_ahead);
        let intent = BookingIntent::new(&settings.booking_keywords);
        Self {
            profile,
            index,
            calendar,
            engine,
            intent,
            settings,
        }
    }

    /// Wire profile, index, and calendar from configuration.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let profile = config.business_profile()?;
        let index = SiteIndex::open(config).await?;
        let calendar = calendar_from_config(config)?;
        info!(
            business_id = %profile.id,
            calendar = calendar.is_some(),
            model = index.embedder().model_id(),
            "grounding service ready"
        );
        Ok(Self::new(profile, index, calendar, GroundingSettings::from(config)))
    }

    pub fn profile(&self) -> &BusinessProfile {
        &self.profile
    }

    pub fn index(&self) -> &SiteIndex {
        &self.index
    }

    /// Top pages for `query`, using the configured `top_k`.
    pub async fn find_relevant_pages(&self, query: &str) -> Outcome<Vec<PageHit>> {
        self.index
            .find_relevant_pages(&self.profile, query, self.settings.top_k)
            .await
    }

    /// Free windows from `now` over `days_ahead` days (configured default when `None`).
    pub async fn free_windows_at(
        &self,
        days_ahead: Option<u32>,
        now: DateTime<Utc>,
    ) -> Outcome<Vec<FreeWindow>> {
        let Some(reader) = self.calendar.as_deref() else {
            return Outcome::unavailable(NO_CALENDAR);
        };
        let days = days_ahead.unwrap_or(self.settings.default_days_ahead);
        Outcome::Available(self.engine.compute_free_windows(reader, days, now).await)
    }

    /// Rendered free-slot summary from `now`.
    pub async fn availability_at(
        &self,
        days_ahead: Option<u32>,
        now: DateTime<Utc>,
    ) -> Outcome<String> {
        self.free_windows_at(days_ahead, now)
            .await
            .map(|windows| render_windows(&windows, self.profile.calendar.timezone))
    }

    pub async fn availability(&self, days_ahead: Option<u32>) -> Outcome<String> {
        self.availability_at(days_ahead, Utc::now()).await
    }

    /// Grounding context for one query.
    pub async fn ground(&self, query: &str, days_ahead: Option<u32>) -> Grounding {
        self.ground_at(query, days_ahead, Utc::now()).await
    }

    #[instrument(skip_all, fields(business_id = %self.profile.id))]
    pub async fn ground_at(
        &self,
        query: &str,
        days_ahead: Option<u32>,
        now: DateTime<Utc>,
    ) -> Grounding {
        let description = self.profile.description.clone();

        if self.intent.matches(query) {
            debug!("booking intent, consulting calendar");
            return Grounding {
                description,
                pages: Outcome::Available(Vec::new()),
                availability: Some(self.availability_at(days_ahead, now).await),
            };
        }

        Grounding {
            description,
            pages: self.find_relevant_pages(query).await,
            availability: None,
        }
    }
}
