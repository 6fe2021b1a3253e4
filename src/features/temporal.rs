//! Temporal feature extraction
//!
//! Date/time derived features of a scheduled departure: high season flag,
//! phase of the day and calendar components. Timestamps are naive local
//! times; no timezone arithmetic happens here.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DelayError, Result};

/// Format of every timestamp in the flight schedule
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// High season as inclusive `(month, day)` ranges within a single year
const HIGH_SEASON_RANGES: [((u32, u32), (u32, u32)); 4] = [
    ((12, 15), (12, 31)),
    ((1, 1), (3, 3)),
    ((7, 15), (7, 31)),
    ((9, 11), (9, 30)),
];

const fn hm(hour: u32, minute: u32) -> u32 {
    hour * 3600 + minute * 60
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        DelayError::MalformedTimestamp {
            value: value.to_string(),
            source,
        }
    })
}

/// Whether the timestamp falls in high season
pub fn is_high_season(ts: &str) -> Result<bool> {
    Ok(is_high_season_date(parse_timestamp(ts)?.date()))
}

/// Whether a calendar date falls in high season (ranges are taken in the
/// date's own year)
pub fn is_high_season_date(date: NaiveDate) -> bool {
    let key = (date.month(), date.day());
    HIGH_SEASON_RANGES
        .iter()
        .any(|&(start, end)| key >= start && key <= end)
}

/// Coarse phase of the day
///
/// Every bound is exclusive. The closed spans 04:59:00 to 05:00:00,
/// 11:59:00 to 12:00:00, 18:59:00 to 19:00:00 and 23:59:00 to 00:00:00
/// belong to no phase and map to [`DayPhase::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPhase {
    Morning,
    Evening,
    Night,
    Undefined,
}

impl DayPhase {
    /// Classify a time of day given as seconds from midnight
    pub fn from_seconds(seconds: u32) -> Self {
        let between = |lo: u32, hi: u32| seconds > lo && seconds < hi;

        if between(hm(5, 0), hm(11, 59)) {
            DayPhase::Morning
        } else if between(hm(12, 0), hm(18, 59)) {
            DayPhase::Evening
        } else if between(hm(19, 0), hm(23, 59)) || between(hm(0, 0), hm(4, 59)) {
            DayPhase::Night
        } else {
            DayPhase::Undefined
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayPhase::Morning => "morning",
            DayPhase::Evening => "evening",
            DayPhase::Night => "night",
            DayPhase::Undefined => "undefined",
        }
    }
}

impl fmt::Display for DayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the day of a timestamp
pub fn day_phase(ts: &str) -> Result<DayPhase> {
    let time = parse_timestamp(ts)?.time();
    Ok(DayPhase::from_seconds(time.num_seconds_from_midnight()))
}

/// Calendar components of a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarParts {
    /// English full weekday name, `Monday`..`Sunday`
    pub weekday: &'static str,
    pub month: u32,
    pub day: u32,
}

/// English full weekday name, independent of locale
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn calendar_parts(ts: &str) -> Result<CalendarParts> {
    Ok(CalendarParts::from_date(parse_timestamp(ts)?.date()))
}

impl CalendarParts {
    pub fn from_date(date: NaiveDate) -> Self {
        CalendarParts {
            weekday: weekday_name(date.weekday()),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// All temporal features of one scheduled departure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemporalContext {
    pub high_season: bool,
    pub day_phase: DayPhase,
    pub calendar: CalendarParts,
}

impl TemporalContext {
    /// Parse the timestamp once and derive every temporal feature from it
    pub fn from_timestamp(ts: &str) -> Result<Self> {
        let parsed = parse_timestamp(ts)?;
        Ok(Self::from_datetime(parsed))
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        TemporalContext {
            high_season: is_high_season_date(dt.date()),
            day_phase: DayPhase::from_seconds(dt.time().num_seconds_from_midnight()),
            calendar: CalendarParts::from_date(dt.date()),
        }
    }
}
