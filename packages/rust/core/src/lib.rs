//! Grounding orchestration for SiteDesk.
//!
//! This crate ties the site index and the availability engine together
//! behind one entry point, [`GroundingService::ground`], which the
//! conversation layer calls once per user query.

pub mod grounding;
pub mod intent;

pub use grounding::{Grounding, GroundingService, GroundingSettings, NO_CALENDAR};
pub use intent::BookingIntent;
