//! Device wake scheduling.
//!
//! Devices ask the server how long to sleep before their next refresh. The
//! answer is aligned to wall-clock boundaries (the top of the hour, every
//! quarter hour) so images refresh at predictable times, plus a render margin
//! so the pre-rendered image is already cached when the device wakes.
//!
//! # Example (YAML)
//!
//! ```yaml
//! # Always sleep 15 minutes
//! sleep:
//!   type: fixed
//!   seconds: 900
//!
//! # Quarter-hourly during the work week, hourly otherwise
//! sleep:
//!   type: policy
//!   policy: workweek
//!
//! # Custom rules, first match wins
//! sleep:
//!   type: schedule
//!   default_interval: 3600
//!   rules:
//!     - days: weekdays
//!       start: "06:00"
//!       end: "09:00"
//!       interval: 600
//!     - days: [sat, sun]
//!       start: "08:00"
//!       end: "20:00"
//!       interval: 1800
//! ```

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::RENDER_MARGIN_SECS;

const QUARTER_HOUR: u32 = 15 * 60;
const HOUR: u32 = 60 * 60;

/// How long a device sleeps between refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SleepDelay {
    /// Always sleep the same number of seconds.
    Fixed { seconds: u32 },
    /// Wake on boundaries chosen by a named policy.
    Policy { policy: SchedulePolicy },
    /// Wake on boundaries chosen by custom rules.
    Schedule {
        /// Interval when no rule matches (seconds)
        default_interval: u32,
        /// Rules, evaluated in order, first match wins
        #[serde(default)]
        rules: Vec<ScheduleRule>,
    },
}

/// One hour, fixed.
impl Default for SleepDelay {
    fn default() -> Self {
        SleepDelay::Fixed { seconds: HOUR }
    }
}

/// Named wake policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Weekdays 06:00-18:00 every 15 minutes, otherwise hourly.
    Workweek,
    /// Top of every hour.
    Hourly,
}

impl SchedulePolicy {
    /// Boundary interval in seconds at local time `now`.
    pub fn interval<T: TimeZone>(&self, now: &DateTime<T>) -> u32 {
        match self {
            SchedulePolicy::Workweek => {
                if is_weekday(now.weekday()) && (6..18).contains(&now.hour()) {
                    QUARTER_HOUR
                } else {
                    HOUR
                }
            }
            SchedulePolicy::Hourly => HOUR,
        }
    }
}

/// A single schedule rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    /// Days this rule applies to
    pub days: DaySelector,
    /// Start time (HH:MM, 24-hour format)
    pub start: String,
    /// End time (HH:MM, 24-hour format, exclusive)
    pub end: String,
    /// Wake interval in seconds
    pub interval: u32,
}

/// Day selector for schedule rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaySelector {
    /// A specific list of days (e.g., ["mon", "tue", "wed"])
    List(Vec<String>),
    /// A named group: "all", "weekdays", "weekends", or a single day name
    Named(String),
}

impl SleepDelay {
    /// Seconds until the device should next wake, at local time `now`.
    ///
    /// Policy and schedule delays land on the next interval boundary past
    /// `now + interval` rounded down, plus [`RENDER_MARGIN_SECS`].
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::TimeZone;
    /// use chrono_tz::America::Los_Angeles as LA;
    /// use inkdash::{SchedulePolicy, SleepDelay};
    ///
    /// let delay = SleepDelay::Policy { policy: SchedulePolicy::Workweek };
    ///
    /// // Monday 9:47: next quarter hour is 10:00, plus two minutes
    /// let now = LA.with_ymd_and_hms(2024, 6, 3, 9, 47, 0).unwrap();
    /// assert_eq!(delay.next_wake_delay(&now), 13 * 60 + 120);
    /// ```
    pub fn next_wake_delay<T: TimeZone>(&self, now: &DateTime<T>) -> u32 {
        let interval = match self {
            SleepDelay::Fixed { seconds } => return *seconds,
            SleepDelay::Policy { policy } => policy.interval(now),
            SleepDelay::Schedule {
                default_interval,
                rules,
            } => {
                let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default();
                match rules.iter().find(|r| r.matches(now.weekday(), time)) {
                    Some(rule) => {
                        tracing::debug!(
                            "Schedule rule matched: {:?} {} -> {} interval={}",
                            rule.days,
                            rule.start,
                            rule.end,
                            rule.interval
                        );
                        rule.interval
                    }
                    None => *default_interval,
                }
            }
        };
        until_next_boundary(now, interval) + RENDER_MARGIN_SECS
    }
}

/// Seconds from `now` to `floor((now + interval) / interval) * interval`,
/// counted from local midnight.
fn until_next_boundary<T: TimeZone>(now: &DateTime<T>, interval: u32) -> u32 {
    if interval == 0 {
        return 0;
    }
    let elapsed = now.num_seconds_from_midnight();
    let next = (elapsed + interval) / interval * interval;
    next - elapsed
}

/// Seconds to wait before pre-rendering for a device that wakes in
/// `wake_delay` seconds. `None` when the wake is too close to bother.
pub fn pre_render_delay(wake_delay: u32) -> Option<u32> {
    wake_delay
        .checked_sub(crate::PRE_RENDER_LEAD_SECS)
        .filter(|d| *d > 0)
}

impl ScheduleRule {
    /// Check if this rule matches the given day and time.
    fn matches(&self, weekday: Weekday, time: NaiveTime) -> bool {
        if !self.day_matches(weekday) {
            return false;
        }

        match (parse_time(&self.start), parse_time(&self.end)) {
            (Some(s), Some(e)) => {
                if s <= e {
                    time >= s && time < e
                } else {
                    // Overnight range (e.g., 23:00 - 06:00)
                    time >= s || time < e
                }
            }
            _ => false,
        }
    }

    /// Check if this rule applies to the given weekday.
    fn day_matches(&self, weekday: Weekday) -> bool {
        match &self.days {
            DaySelector::Named(name) => match name.to_lowercase().as_str() {
                "all" => true,
                "weekdays" => is_weekday(weekday),
                "weekends" => !is_weekday(weekday),
                _ => weekday_from_str(name) == Some(weekday),
            },
            DaySelector::List(days) => days.iter().any(|d| weekday_from_str(d) == Some(weekday)),
        }
    }
}

fn is_weekday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Parse a time string (HH:MM) into NaiveTime.
fn parse_time(s: &str) -> Option<NaiveTime> {
    let (hour, minute) = s.split_once(':')?;
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Convert a day name to Weekday.
fn weekday_from_str(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
