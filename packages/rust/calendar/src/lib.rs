//! Business-hours availability for SiteDesk.
//!
//! [`CalendarReader`] implementations supply busy intervals; the
//! [`AvailabilityEngine`] turns them into free booking windows in the
//! business timezone and [`render_windows`] formats them for a reply.

pub mod availability;
pub mod reader;

pub use availability::{
    AvailabilityEngine, BusyInterval, FreeWindow, NO_AVAILABILITY, render_windows,
};
pub use reader::{
    BusyEntry, CalendarReader, CalendarTime, JsonFeedCalendar, JsonFileCalendar, StaticCalendar,
    calendar_from_config, parse_busy_json,
};
