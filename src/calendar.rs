//! Calendar events and the collection handed to the compositor.
//!
//! Calendar providers are collaborators: anything implementing
//! [`CalendarSource`] can feed a device. [`SnapshotCalendar`] replays an
//! on-disk snapshot written by [`Calendar::save`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, DurationRound, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{persist_atomically, Error, FilterPipeline};

/// Truncate an instant to the start of its local hour (the grid reference hour).
///
/// Works on the instant, so the repeated hour when clocks fall back keeps
/// its own offset.
pub fn reference_hour(now: &DateTime<Tz>) -> DateTime<Tz> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(*now)
}

/// A single calendar event.
///
/// Constructed through [`CalendarEvent::new`], which validates the fields and
/// normalizes all-day end times once, at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    summary: String,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    all_day: bool,
}

impl CalendarEvent {
    /// Create an event.
    ///
    /// For all-day events `end` is the provider's exclusive end (midnight of
    /// the following day); it is stored as 23:59:59 of the last included day.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if the summary is blank or `end < start`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::TimeZone;
    /// use chrono_tz::America::Los_Angeles as LA;
    /// use inkdash::CalendarEvent;
    ///
    /// let start = LA.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    /// let end = LA.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
    /// let event = CalendarEvent::new("Field day", start, end, true).unwrap();
    ///
    /// assert_eq!(event.end(), &LA.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap());
    /// ```
    pub fn new(
        summary: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        all_day: bool,
    ) -> Result<Self, Error> {
        let mut event = Self::restore(summary, start, end, all_day)?;
        if all_day {
            event.end = inclusive_day_end(&event.start, &event.end);
        }
        Ok(event)
    }

    /// Rebuild an already-normalized event (e.g. from a snapshot) without
    /// adjusting the all-day end again.
    fn restore(
        summary: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        all_day: bool,
    ) -> Result<Self, Error> {
        let summary = summary.into();
        if summary.trim().is_empty() {
            return Err(Error::invalid("event", "summary cannot be empty"));
        }
        if end < start {
            return Err(Error::invalid(
                "event",
                format!("'{}' ends ({}) before it starts ({})", summary, end, start),
            ));
        }
        Ok(Self {
            summary,
            start,
            end,
            all_day,
        })
    }

    /// Event title, already redacted.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Start instant.
    pub fn start(&self) -> &DateTime<Tz> {
        &self.start
    }

    /// End instant. For all-day events, 23:59:59 of the last day.
    pub fn end(&self) -> &DateTime<Tz> {
        &self.end
    }

    /// Whether this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    /// `end - start`.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether any part of the event falls on the given local date.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        // An event ending exactly at midnight does not spill into that day
        let last = if self.end > self.start {
            self.end - Duration::seconds(1)
        } else {
            self.end
        };
        self.start.date_naive() <= date && date <= last.date_naive()
    }
}

/// 23:59:59 of the last day covered by an all-day event with exclusive `end`.
fn inclusive_day_end(start: &DateTime<Tz>, end: &DateTime<Tz>) -> DateTime<Tz> {
    let local = end.naive_local();
    let mut last_day = local.date();
    if local.time() == NaiveTime::MIN {
        last_day = last_day.pred_opt().unwrap_or(last_day);
    }
    let last_day = last_day.max(start.date_naive());

    let day_end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    end.timezone()
        .from_local_datetime(&last_day.and_time(day_end))
        .latest()
        .unwrap_or_else(|| *end - Duration::seconds(1))
}

/// Snapshot record: instants keep their original offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventRecord {
    summary: String,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    #[serde(default)]
    all_day: bool,
}

/// Transient collection of events for one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    events: Vec<CalendarEvent>,
}

impl Calendar {
    /// Create an empty calendar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event.
    pub fn add(&mut self, event: CalendarEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    /// Remove all events.
    pub fn clear(&mut self) -> &mut Self {
        self.events.clear();
        self
    }

    /// Sort events by start time. Stable, so equal starts keep insertion order.
    pub fn sort(&mut self) -> &mut Self {
        self.events.sort_by_key(|e| e.start);
        self
    }

    /// All events in their current order.
    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    /// Whether there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop events that ended before the start of the current hour.
    pub fn retain_upcoming(&mut self, now: &DateTime<Tz>) -> &mut Self {
        let hour = reference_hour(now);
        self.events.retain(|e| e.end > hour);
        self
    }

    /// Timed (not all-day) events.
    pub fn timed(&self) -> Vec<CalendarEvent> {
        self.events.iter().filter(|e| !e.all_day).cloned().collect()
    }

    /// All-day events.
    pub fn all_day(&self) -> Vec<CalendarEvent> {
        self.events.iter().filter(|e| e.all_day).cloned().collect()
    }

    /// Events touching the given local date.
    pub fn on_day(&self, date: NaiveDate) -> Vec<CalendarEvent> {
        self.events
            .iter()
            .filter(|e| e.occurs_on(date))
            .cloned()
            .collect()
    }

    /// Write the events to a JSON snapshot.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let records: Vec<EventRecord> = self
            .events
            .iter()
            .map(|e| EventRecord {
                summary: e.summary.clone(),
                start: e.start.fixed_offset(),
                end: e.end.fixed_offset(),
                all_day: e.all_day,
            })
            .collect();
        let json = serde_json::to_vec_pretty(&records)?;
        persist_atomically(path.as_ref(), &json)?;
        tracing::debug!(
            "Calendar data saved to \"{}\" ({} events)",
            path.as_ref().display(),
            records.len()
        );
        Ok(())
    }

    /// Read a JSON snapshot, converting instants to `tz`.
    pub fn load<P: AsRef<Path>>(path: P, tz: Tz) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Io(format!(
                "Failed to read calendar snapshot '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let records: Vec<EventRecord> = serde_json::from_str(&content)?;

        let mut calendar = Self::new();
        for r in records {
            calendar.add(CalendarEvent::restore(
                r.summary,
                r.start.with_timezone(&tz),
                r.end.with_timezone(&tz),
                r.all_day,
            )?);
        }
        Ok(calendar)
    }
}

impl FromIterator<CalendarEvent> for Calendar {
    fn from_iter<I: IntoIterator<Item = CalendarEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// A provider of calendar events.
pub trait CalendarSource: Send + Sync {
    /// Events touching `days` days starting at `from`, with summaries passed
    /// through `filters`, sorted by start.
    fn events(&self, from: NaiveDate, days: u32, filters: &FilterPipeline) -> Result<Calendar, Error>;
}

/// Calendar source that replays a JSON snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotCalendar {
    path: PathBuf,
    tz: Tz,
}

impl SnapshotCalendar {
    /// Create a snapshot source reading `path`, presenting times in `tz`.
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            path: path.into(),
            tz,
        }
    }
}

impl CalendarSource for SnapshotCalendar {
    fn events(&self, from: NaiveDate, days: u32, filters: &FilterPipeline) -> Result<Calendar, Error> {
        let snapshot = Calendar::load(&self.path, self.tz)?;
        let window: Vec<NaiveDate> = from.iter_days().take(days as usize).collect();

        let mut calendar = Calendar::new();
        for event in snapshot.events {
            if !window.iter().any(|d| event.occurs_on(*d)) {
                continue;
            }

            let summary = filters.apply(&event.summary);
            if summary.is_empty() {
                tracing::debug!("Event '{}' filtered out", event.summary);
                continue;
            }
            calendar.add(CalendarEvent { summary, ..event });
        }
        calendar.sort();
        Ok(calendar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles as LA;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Tz> {
        LA.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_all_day_end_adjusted() {
        let event = CalendarEvent::new("Holiday", at(1, 0, 0), at(2, 0, 0), true).unwrap();
        assert_eq!(event.end(), &LA.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap());
        assert!(event.occurs_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
        assert!(!event.occurs_on(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()));
    }

    #[test]
    fn test_multi_day_all_day_event() {
        let event = CalendarEvent::new("Camp", at(1, 0, 0), at(4, 0, 0), true).unwrap();
        assert_eq!(event.end(), &LA.with_ymd_and_hms(2024, 6, 3, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_zero_length_all_day_stays_on_start_day() {
        let event = CalendarEvent::new("Marker", at(1, 0, 0), at(1, 0, 0), true).unwrap();
        assert_eq!(event.end(), &LA.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_timed_event_untouched() {
        let event = CalendarEvent::new("Standup", at(3, 9, 0), at(3, 9, 30), false).unwrap();
        assert_eq!(event.end(), &at(3, 9, 30));
        assert_eq!(event.duration(), Duration::minutes(30));
    }

    #[test]
    fn test_invalid_events_rejected() {
        assert!(CalendarEvent::new("  ", at(3, 9, 0), at(3, 10, 0), false).is_err());
        assert!(CalendarEvent::new("Backwards", at(3, 10, 0), at(3, 9, 0), false).is_err());
    }

    #[test]
    fn test_event_ending_at_midnight_stays_on_its_day() {
        let event = CalendarEvent::new("Late", at(3, 23, 0), at(4, 0, 0), false).unwrap();
        assert!(event.occurs_on(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        assert!(!event.occurs_on(NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()));
    }

    #[test]
    fn test_reference_hour() {
        let now = LA.with_ymd_and_hms(2024, 6, 3, 9, 47, 13).unwrap();
        assert_eq!(reference_hour(&now), at(3, 9, 0));
    }

    #[test]
    fn test_reference_hour_when_clocks_fall_back() {
        use chrono::{Timelike, Utc};

        // 08:30Z and 09:30Z are both 01:30 local on 2024-11-03
        let first = Utc.with_ymd_and_hms(2024, 11, 3, 8, 30, 0).unwrap().with_timezone(&LA);
        let second = Utc.with_ymd_and_hms(2024, 11, 3, 9, 30, 0).unwrap().with_timezone(&LA);

        let hour = reference_hour(&first);
        assert_eq!((hour.hour(), hour.minute(), hour.second()), (1, 0, 0));
        assert_eq!(hour, Utc.with_ymd_and_hms(2024, 11, 3, 8, 0, 0).unwrap());

        let hour = reference_hour(&second);
        assert_eq!((hour.hour(), hour.minute()), (1, 0));
        assert_eq!(hour, Utc.with_ymd_and_hms(2024, 11, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_sort_and_upcoming() {
        let mut cal = Calendar::new();
        cal.add(CalendarEvent::new("Lunch", at(3, 12, 0), at(3, 13, 0), false).unwrap())
            .add(CalendarEvent::new("Early", at(3, 7, 0), at(3, 8, 0), false).unwrap())
            .add(CalendarEvent::new("Standup", at(3, 9, 0), at(3, 9, 15), false).unwrap());
        cal.sort();
        let names: Vec<&str> = cal.events().iter().map(|e| e.summary()).collect();
        assert_eq!(names, ["Early", "Standup", "Lunch"]);

        // 9:47 -> reference hour 9:00; "Early" ended before that
        cal.retain_upcoming(&at(3, 9, 47));
        let names: Vec<&str> = cal.events().iter().map(|e| e.summary()).collect();
        assert_eq!(names, ["Standup", "Lunch"]);
    }

    #[test]
    fn test_timed_and_all_day_split() {
        let cal: Calendar = vec![
            CalendarEvent::new("Holiday", at(3, 0, 0), at(4, 0, 0), true).unwrap(),
            CalendarEvent::new("Standup", at(3, 9, 0), at(3, 9, 15), false).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(cal.timed().len(), 1);
        assert_eq!(cal.all_day()[0].summary(), "Holiday");
    }

    #[test]
    fn test_snapshot_round_trip_keeps_all_day_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");

        let mut cal = Calendar::new();
        cal.add(CalendarEvent::new("Holiday", at(1, 0, 0), at(2, 0, 0), true).unwrap());
        cal.save(&path).unwrap();

        let loaded = Calendar::load(&path, LA).unwrap();
        assert_eq!(loaded, cal);
    }

    #[test]
    fn test_snapshot_source_filters_and_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");

        let mut cal = Calendar::new();
        cal.add(CalendarEvent::new("Review (optional)", at(3, 14, 0), at(3, 15, 0), false).unwrap())
            .add(CalendarEvent::new("[private]", at(3, 9, 0), at(3, 10, 0), false).unwrap())
            .add(CalendarEvent::new("Standup", at(3, 9, 0), at(3, 9, 15), false).unwrap())
            .add(CalendarEvent::new("Next week", at(10, 9, 0), at(10, 10, 0), false).unwrap());
        cal.save(&path).unwrap();

        let source = SnapshotCalendar::new(&path, LA);
        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let events = source.events(day, 1, &FilterPipeline::with_default()).unwrap();

        let names: Vec<&str> = events.events().iter().map(|e| e.summary()).collect();
        assert_eq!(names, ["Standup", "Review"]);
    }

    #[test]
    fn test_snapshot_missing_file_is_error() {
        let source = SnapshotCalendar::new("/nonexistent/calendar.json", LA);
        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert!(source.events(day, 1, &FilterPipeline::new()).is_err());
    }
}
