//! Free booking windows inside business hours.
//!
//! All arithmetic happens in the business timezone. A day's window is
//! `[hours_start, hours_end)` local time; busy intervals are clipped to it and
//! swept in start order to produce the gaps.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use sitedesk_shared::{BusinessCalendar, Outcome};

use crate::reader::{BusyEntry, CalendarReader, resolve_local};

/// Text rendered when no window is free.
pub const NO_AVAILABILITY: &str = "No free booking slots are available in the requested period.";

/// A free half-open interval `[start, end)` in the business timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// A busy interval resolved into the business timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Computes free windows from a business calendar and a busy-interval reader.
#[derive(Debug, Clone)]
pub struct AvailabilityEngine {
    calendar: BusinessCalendar,
    max_days_ahead: u32,
}

impl AvailabilityEngine {
    pub fn new(calendar: BusinessCalendar, max_days_ahead: u32) -> Self {
        Self {
            calendar,
            max_days_ahead,
        }
    }

    /// Free windows for `days_ahead` local days starting today, ascending.
    ///
    /// Makes a single reader call covering the whole horizon. A reader
    /// failure is logged and treated as a calendar with no busy time.
    #[instrument(skip_all, fields(days_ahead = days_ahead, tz = %self.calendar.timezone))]
    pub async fn compute_free_windows(
        &self,
        reader: &dyn CalendarReader,
        days_ahead: u32,
        now: DateTime<Utc>,
    ) -> Vec<FreeWindow> {
        let days = days_ahead.min(self.max_days_ahead);
        if days == 0 {
            return Vec::new();
        }

        let range_end = now + Duration::days(i64::from(days));
        let entries = match reader.busy_intervals(now, range_end).await {
            Outcome::Available(entries) => entries,
            Outcome::Unavailable { reason } => {
                warn!(%reason, "calendar unavailable, assuming no busy time");
                Vec::new()
            }
        };

        let tz = self.calendar.timezone;
        let busy = to_busy_intervals(&entries, tz);
        let today = now.with_timezone(&tz).date_naive();

        let mut windows = Vec::new();
        for date in today.iter_days().take(days as usize) {
            if let Some((day_start, day_end)) = day_window(&self.calendar, date, now) {
                windows.extend(free_windows_for_day(day_start, day_end, &busy));
            }
        }

        debug!(busy = busy.len(), windows = windows.len(), "computed free windows");
        windows
    }
}

/// Business-hours window for `date`, clipped to `now`. `None` when the day
/// has already ended or the hours do not resolve.
pub fn day_window(
    calendar: &BusinessCalendar,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let tz = calendar.timezone;
    let start = resolve_local(tz, date.and_time(hour(calendar.hours_start)?))?;
    let end = if calendar.hours_end >= 24 {
        resolve_local(tz, date.succ_opt()?.and_time(NaiveTime::MIN))?
    } else {
        resolve_local(tz, date.and_time(hour(calendar.hours_end)?))?
    };

    let now = now.with_timezone(&tz);
    if end <= now {
        return None;
    }
    let start = start.max(now);
    (start < end).then_some((start, end))
}

fn hour(h: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(h, 0, 0)
}

/// Resolve provider entries into the business timezone, dropping entries
/// that are empty, inverted, or unresolvable.
pub fn to_busy_intervals(entries: &[BusyEntry], tz: Tz) -> Vec<BusyInterval> {
    entries
        .iter()
        .filter_map(|entry| {
            let start = entry.start.in_zone(tz)?;
            let end = entry.end.in_zone(tz)?;
            (start < end).then_some(BusyInterval { start, end })
        })
        .collect()
}

/// Gaps in `[day_start, day_end)` not covered by any busy interval.
pub fn free_windows_for_day(
    day_start: DateTime<Tz>,
    day_end: DateTime<Tz>,
    busy: &[BusyInterval],
) -> Vec<FreeWindow> {
    let mut clipped: Vec<BusyInterval> = busy
        .iter()
        .filter(|b| b.start < day_end && b.end > day_start)
        .map(|b| BusyInterval {
            start: b.start.max(day_start),
            end: b.end.min(day_end),
        })
        .collect();
    clipped.sort_by_key(|b| b.start);

    let mut windows = Vec::new();
    let mut pointer = day_start;
    for b in &clipped {
        if b.start > pointer {
            windows.push(FreeWindow {
                start: pointer,
                end: b.start,
            });
        }
        pointer = pointer.max(b.end);
    }
    if pointer < day_end {
        windows.push(FreeWindow {
            start: pointer,
            end: day_end,
        });
    }
    windows
}

/// Render windows as one line per local date, e.g.
/// `Mon 2026-10-19: 09:00–10:00, 11:00–13:00`.
pub fn render_windows(windows: &[FreeWindow], tz: Tz) -> String {
    if windows.is_empty() {
        return NO_AVAILABILITY.to_string();
    }

    let mut lines: Vec<(NaiveDate, String, Vec<String>)> = Vec::new();
    for window in windows {
        let start = window.start.with_timezone(&tz);
        let end = window.end.with_timezone(&tz);
        let date = start.date_naive();
        let end_label = if end.date_naive() > date && end.time() == NaiveTime::MIN {
            "24:00".to_string()
        } else {
            end.format("%H:%M").to_string()
        };
        let slot = format!("{}–{}", start.format("%H:%M"), end_label);

        match lines.last_mut() {
            Some((last, _, slots)) if *last == date => slots.push(slot),
            _ => lines.push((date, start.format("%a %Y-%m-%d").to_string(), vec![slot])),
        }
    }

    lines
        .into_iter()
        .map(|(_, header, slots)| format!("{header}: {}", slots.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CalendarTime, StaticCalendar};
    use async_trait::async_trait;
    use chrono::Timelike;
    use std::sync::Mutex;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn busy(start: &str, end: &str) -> BusyEntry {
        BusyEntry {
            start: CalendarTime::parse(start).unwrap(),
            end: CalendarTime::parse(end).unwrap(),
            label: String::new(),
        }
    }

    fn hhmm(windows: &[FreeWindow]) -> Vec<(String, String)> {
        windows
            .iter()
            .map(|w| {
                (
                    w.start.format("%H:%M").to_string(),
                    w.end.format("%H:%M").to_string(),
                )
            })
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    /// Records every requested range.
    struct CountingCalendar {
        inner: StaticCalendar,
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl CountingCalendar {
        fn new(entries: Vec<BusyEntry>) -> Self {
            Self {
                inner: StaticCalendar::new(entries),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CalendarReader for CountingCalendar {
        async fn busy_intervals(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Outcome<Vec<BusyEntry>> {
            self.calls.lock().unwrap().push((start, end));
            self.inner.busy_intervals(start, end).await
        }
    }

    struct BrokenCalendar;

    #[async_trait]
    impl CalendarReader for BrokenCalendar {
        async fn busy_intervals(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Outcome<Vec<BusyEntry>> {
            Outcome::unavailable("calendar offline")
        }
    }

    fn engine() -> AvailabilityEngine {
        AvailabilityEngine::new(BusinessCalendar::default(), 30)
    }

    #[tokio::test]
    async fn gaps_between_busy_intervals() {
        let reader = StaticCalendar::new(vec![
            busy("2026-07-15T10:00:00Z", "2026-07-15T11:00:00Z"),
            busy("2026-07-15T13:00:00Z", "2026-07-15T14:00:00Z"),
        ]);
        let windows = engine()
            .compute_free_windows(&reader, 1, utc("2026-07-15T06:00:00Z"))
            .await;
        assert_eq!(
            hhmm(&windows),
            pairs(&[("09:00", "10:00"), ("11:00", "13:00"), ("14:00", "17:00")])
        );
        assert_eq!(
            render_windows(&windows, Tz::UTC),
            "Wed 2026-07-15: 09:00–10:00, 11:00–13:00, 14:00–17:00"
        );
    }

    #[tokio::test]
    async fn today_is_clipped_to_now() {
        let windows = engine()
            .compute_free_windows(&StaticCalendar::default(), 1, utc("2026-07-15T16:30:00Z"))
            .await;
        assert_eq!(hhmm(&windows), pairs(&[("16:30", "17:00")]));
    }

    #[tokio::test]
    async fn finished_day_is_skipped() {
        let windows = engine()
            .compute_free_windows(&StaticCalendar::default(), 2, utc("2026-07-15T17:30:00Z"))
            .await;
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0].start.date_naive(),
            NaiveDate::from_ymd_opt(2026, 7, 16).unwrap()
        );
        assert_eq!(hhmm(&windows), pairs(&[("09:00", "17:00")]));
    }

    #[tokio::test]
    async fn instants_converted_and_local_times_kept() {
        let calendar = BusinessCalendar::new("Europe/Sofia", 9, 17).unwrap();
        let engine = AvailabilityEngine::new(calendar, 30);
        let reader = StaticCalendar::new(vec![
            // 11:00-12:00 Sofia time (UTC+3 in summer).
            busy("2026-07-15T08:00:00Z", "2026-07-15T09:00:00Z"),
            // Zone-less: already Sofia time.
            busy("2026-07-15T14:00:00", "2026-07-15T15:00:00"),
        ]);
        let windows = engine
            .compute_free_windows(&reader, 1, utc("2026-07-15T04:00:00Z"))
            .await;
        assert_eq!(
            hhmm(&windows),
            pairs(&[("09:00", "11:00"), ("12:00", "14:00"), ("15:00", "17:00")])
        );
    }

    #[tokio::test]
    async fn overlapping_and_unsorted_busy_intervals() {
        let reader = StaticCalendar::new(vec![
            busy("2026-07-15T12:00:00Z", "2026-07-15T13:00:00Z"),
            busy("2026-07-15T09:30:00Z", "2026-07-15T10:30:00Z"),
            busy("2026-07-15T10:00:00Z", "2026-07-15T11:00:00Z"),
            busy("2026-07-15T18:00:00Z", "2026-07-15T19:00:00Z"),
            // Inverted entries are ignored.
            busy("2026-07-15T15:00:00Z", "2026-07-15T14:00:00Z"),
        ]);
        let windows = engine()
            .compute_free_windows(&reader, 1, utc("2026-07-15T06:00:00Z"))
            .await;
        assert_eq!(
            hhmm(&windows),
            pairs(&[("09:00", "09:30"), ("11:00", "12:00"), ("13:00", "17:00")])
        );
    }

    #[tokio::test]
    async fn fully_booked_day_has_no_windows() {
        let reader = StaticCalendar::new(vec![busy(
            "2026-07-15T08:00:00Z",
            "2026-07-15T18:00:00Z",
        )]);
        let windows = engine()
            .compute_free_windows(&reader, 1, utc("2026-07-15T06:00:00Z"))
            .await;
        assert!(windows.is_empty());
        assert_eq!(render_windows(&windows, Tz::UTC), NO_AVAILABILITY);
    }

    #[tokio::test]
    async fn one_reader_call_for_the_whole_horizon() {
        let reader = CountingCalendar::new(Vec::new());
        let now = utc("2026-07-15T06:00:00Z");
        let windows = engine().compute_free_windows(&reader, 5, now).await;
        assert_eq!(windows.len(), 5);

        let calls = reader.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(now, utc("2026-07-20T06:00:00Z"))]);
    }

    #[tokio::test]
    async fn days_ahead_is_clamped() {
        let reader = CountingCalendar::new(Vec::new());
        let now = utc("2026-07-15T06:00:00Z");
        let engine = AvailabilityEngine::new(BusinessCalendar::default(), 3);
        let windows = engine.compute_free_windows(&reader, 10, now).await;
        assert_eq!(windows.len(), 3);
        assert_eq!(reader.calls.lock().unwrap()[0].1, utc("2026-07-18T06:00:00Z"));
    }

    #[tokio::test]
    async fn zero_days_does_not_call_reader() {
        let reader = CountingCalendar::new(Vec::new());
        let windows = engine()
            .compute_free_windows(&reader, 0, utc("2026-07-15T06:00:00Z"))
            .await;
        assert!(windows.is_empty());
        assert!(reader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reader_failure_means_no_busy_time() {
        let windows = engine()
            .compute_free_windows(&BrokenCalendar, 2, utc("2026-07-15T06:00:00Z"))
            .await;
        assert_eq!(
            hhmm(&windows),
            pairs(&[("09:00", "17:00"), ("09:00", "17:00")])
        );
    }

    #[tokio::test]
    async fn windows_never_touch_busy_time() {
        let entries = vec![
            busy("2026-07-15T09:15:00Z", "2026-07-15T09:45:00Z"),
            busy("2026-07-15T12:00:00Z", "2026-07-16T10:00:00Z"),
            busy("2026-07-16T16:59:00Z", "2026-07-16T20:00:00Z"),
        ];
        let tz = Tz::UTC;
        let intervals = to_busy_intervals(&entries, tz);
        let windows = engine()
            .compute_free_windows(
                &StaticCalendar::new(entries),
                3,
                utc("2026-07-15T06:00:00Z"),
            )
            .await;

        assert!(!windows.is_empty());
        for w in &windows {
            assert!(w.start < w.end);
            assert!(w.start.hour() >= 9);
            assert!(w.end.hour() < 17 || (w.end.hour() == 17 && w.end.minute() == 0));
            for b in &intervals {
                assert!(w.end <= b.start || w.start >= b.end, "{w:?} overlaps {b:?}");
            }
        }
        assert!(windows.windows(2).all(|pair| pair[0].end <= pair[1].start));

        // Free time plus clipped busy time covers each day's hours exactly.
        let now = utc("2026-07-15T06:00:00Z");
        for date in now.date_naive().iter_days().take(3) {
            let (day_start, day_end) =
                day_window(&BusinessCalendar::default(), date, now).unwrap();
            let free: Duration = windows
                .iter()
                .filter(|w| w.start >= day_start && w.end <= day_end)
                .map(|w| w.end - w.start)
                .sum();
            let busy: Duration = intervals
                .iter()
                .filter(|b| b.start < day_end && b.end > day_start)
                .map(|b| b.end.min(day_end) - b.start.max(day_start))
                .sum();
            assert_eq!(free + busy, day_end - day_start, "{date}");
        }
    }

    #[tokio::test]
    async fn dst_gap_day_starts_after_the_gap() {
        // Clocks jump from 02:00 to 03:00 on 2026-03-08 in New York.
        let calendar = BusinessCalendar::new("America/New_York", 2, 5).unwrap();
        let engine = AvailabilityEngine::new(calendar, 30);
        let reader = StaticCalendar::new(vec![busy("2026-03-08T02:30", "2026-03-08T03:30")]);
        let windows = engine
            .compute_free_windows(&reader, 1, utc("2026-03-08T05:00:00Z"))
            .await;
        assert_eq!(hhmm(&windows), pairs(&[("03:30", "05:00")]));
    }

    #[tokio::test]
    async fn hours_until_midnight_render_as_24() {
        let calendar = BusinessCalendar::new("UTC", 20, 24).unwrap();
        let engine = AvailabilityEngine::new(calendar, 30);
        let windows = engine
            .compute_free_windows(&StaticCalendar::default(), 1, utc("2026-07-15T06:00:00Z"))
            .await;
        assert_eq!(render_windows(&windows, Tz::UTC), "Wed 2026-07-15: 20:00–24:00");
    }

    #[test]
    fn render_groups_by_local_date() {
        let tz = chrono_tz::Europe::Sofia;
        let at = |s: &str| utc(s).with_timezone(&tz);
        let windows = vec![
            FreeWindow {
                start: at("2026-10-19T06:00:00Z"),
                end: at("2026-10-19T07:00:00Z"),
            },
            FreeWindow {
                start: at("2026-10-19T08:00:00Z"),
                end: at("2026-10-19T10:00:00Z"),
            },
            FreeWindow {
                start: at("2026-10-20T06:00:00Z"),
                end: at("2026-10-20T14:00:00Z"),
            },
        ];
        assert_eq!(
            render_windows(&windows, tz),
            "Mon 2026-10-19: 09:00–10:00, 11:00–13:00\nTue 2026-10-20: 09:00–17:00"
        );
    }
}
