/// Utility functions for time handling and formatting
use chrono::{Local, Offset, TimeZone};
use log::warn;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy)]
enum Zone {
    /// System time zone, consulted on every call
    System,
    Fixed(UtcOffset),
    Rule(fn(OffsetDateTime) -> UtcOffset),
}

/// Local wall clock used to timestamp readings
///
/// The offset is resolved for each instant, so a DST change moves both the
/// record timestamps and the daily file boundary without a restart.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    zone: Zone,
}

impl LocalClock {
    /// Follow the system time zone.
    pub fn system() -> Self {
        Self { zone: Zone::System }
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self {
            zone: Zone::Fixed(offset),
        }
    }

    /// Clock whose offset is chosen by `rule` for each instant
    pub fn with_rule(rule: fn(OffsetDateTime) -> UtcOffset) -> Self {
        Self {
            zone: Zone::Rule(rule),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.at(OffsetDateTime::now_utc())
    }

    /// Express `instant` in the offset in force at that instant
    pub fn at(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset_at(instant))
    }

    pub fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        match self.zone {
            Zone::System => system_offset(instant),
            Zone::Fixed(offset) => offset,
            Zone::Rule(rule) => rule(instant),
        }
    }
}

fn system_offset(instant: OffsetDateTime) -> UtcOffset {
    let seconds = match Local.timestamp_opt(instant.unix_timestamp(), 0).single() {
        Some(local) => local.offset().fix().local_minus_utc(),
        None => 0,
    };
    UtcOffset::from_whole_seconds(seconds).unwrap_or_else(|e| {
        warn!("Unusable local UTC offset {}s ({}), using UTC", seconds, e);
        UtcOffset::UTC
    })
}

/// Format a timestamp for log records
///
/// Produces YYYY-MM-DD HH:MM:SS in the timestamp's own offset.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Format a calendar date as YYYY-MM-DD, used to partition log files by day.
pub fn format_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_else(|_| date.to_string())
}

/// Whole seconds from `earlier` to `later`, negative if the clock went back.
pub fn elapsed_seconds(earlier: OffsetDateTime, later: OffsetDateTime) -> i64 {
    (later - earlier).whole_seconds()
}

/// Arithmetic mean of the samples, 0 for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
