//! Service-day times, GTFS dates and the ranges the filters work with.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::ops::Add;

use crate::error::{Error, Result};

const GTFS_DATE_FORMAT: &str = "%Y%m%d";

/// Seconds since midnight of a service day. May exceed 24:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GtfsTime(pub u32);

impl GtfsTime {
    /// Parses `H:MM:SS` or `HH:MM:SS`; hours are not capped at 23.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::parse("time", s));
        };
        if h.is_empty() || m.len() != 2 || sec.len() != 2 {
            return Err(Error::parse("time", s));
        }

        let hours: u32 = h.parse().map_err(|_| Error::parse("time", s))?;
        let minutes: u32 = m.parse().map_err(|_| Error::parse("time", s))?;
        let seconds: u32 = sec.parse().map_err(|_| Error::parse("time", s))?;
        if minutes > 59 || seconds > 59 {
            return Err(Error::parse("time", s));
        }

        hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .map(GtfsTime)
            .ok_or_else(|| Error::parse("time", s))
    }

    /// Blank values mean "not specified".
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(s).map(Some)
        }
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// Shifts by a signed number of seconds, saturating at midnight.
    pub fn offset(self, secs: i64) -> Self {
        let shifted = (self.0 as i64 + secs).max(0);
        GtfsTime(u32::try_from(shifted).unwrap_or(u32::MAX))
    }
}

impl Add<u32> for GtfsTime {
    type Output = Self;

    /// Saturates instead of wrapping past `u32::MAX` seconds.
    fn add(self, rhs: u32) -> Self::Output {
        GtfsTime(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            self.0 % 3600 / 60,
            self.0 % 60
        )
    }
}

/// Parses a date as stored in a feed (`YYYYMMDD`).
pub fn parse_gtfs_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), GTFS_DATE_FORMAT).map_err(|_| Error::parse("date", s))
}

/// Parses a date given by a user: `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_user_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, GTFS_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| Error::parse("date", s))
}

pub fn format_gtfs_date(date: NaiveDate) -> String {
    date.format(GTFS_DATE_FORMAT).to_string()
}

/// Inclusive calendar date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Configuration(format!(
                "date range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn includes(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.end >= other.start && other.end >= self.start
    }
}

/// Inclusive time-of-day window on a service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: GtfsTime,
    pub end: GtfsTime,
}

impl TimeRange {
    pub fn new(start: GtfsTime, end: GtfsTime) -> Result<Self> {
        if end < start {
            return Err(Error::Configuration(format!(
                "time range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: GtfsTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Both endpoints of `[start, end]` lie inside the range.
    pub fn wholly_contains(&self, start: GtfsTime, end: GtfsTime) -> bool {
        self.start <= start && end <= self.end
    }

    /// `[start, end]` overlaps the range.
    pub fn overlaps(&self, start: GtfsTime, end: GtfsTime) -> bool {
        end >= self.start && self.end >= start
    }

    /// A stop is served in range if either of its times falls inside it.
    /// A stop with neither time is never in range.
    pub fn serves(&self, arrival: Option<GtfsTime>, departure: Option<GtfsTime>) -> bool {
        arrival.is_some_and(|t| self.contains(t)) || departure.is_some_and(|t| self.contains(t))
    }
}
