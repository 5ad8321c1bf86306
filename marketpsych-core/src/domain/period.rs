//! Inclusive time windows and the feed's flexible timestamp format.
//!
//! Timestamps are written `yyyy(-?mm(-?dd(-?HHMM)?)?)?`. Missing parts
//! are filled with the start of the period when parsing a start bound and
//! with the end of the period when parsing an end bound, so `2023-02` as an
//! end bound means `2023-02-28 23:59`.

use super::frequency::Granularity;
use crate::error::ConfigError;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static DATE_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(\d{4})                                    # yyyy
        (?: \W? (\d{2})                             # mm
            (?: \W? (\d{2})                         # dd
                (?: \W? (\d{2}) \W? (\d{2}) (?:\W.*)? )?   # HH, MM and leftovers
            )?
        )?
        $",
    )
    .expect("date pattern compiles")
});

/// Which end of a period a partial timestamp stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Parse a (possibly partial) timestamp.
pub fn parse_timestamp(s: &str, bound: Bound) -> Result<NaiveDateTime, ConfigError> {
    let invalid = || ConfigError::InvalidTimestamp(s.to_string());
    let caps = DATE_PAT.captures(s.trim()).ok_or_else(invalid)?;

    let defaults: [u32; 4] = match bound {
        Bound::Start => [1, 1, 0, 0],
        Bound::End => [12, 31, 23, 59],
    };
    let part = |idx: usize, default: u32| -> Result<u32, ConfigError> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse().map_err(|_| invalid()),
            None => Ok(default),
        }
    };

    let year: i32 = caps[1].parse().map_err(|_| invalid())?;
    let month = part(2, defaults[0])?;
    let day = part(3, defaults[1])?;
    let hour = part(4, defaults[2])?;
    let minute = part(5, defaults[3])?;

    let last = days_in_month(year, month).ok_or_else(invalid)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Inclusive `[start, end]` window. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Period {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Whole days from `start` through `end`.
    pub fn days(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        Self::new(
            start.and_time(chrono::NaiveTime::MIN),
            end.and_hms_opt(23, 59, 59).unwrap_or(end.and_time(chrono::NaiveTime::MIN)),
        )
    }

    /// Parse `start` and an optional `end`; a missing end closes the
    /// period containing `start` (`2023-01` alone is all of January).
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self, ConfigError> {
        let s = parse_timestamp(start, Bound::Start)?;
        let e = parse_timestamp(end.unwrap_or(start), Bound::End)?;
        Self::new(s, e)
    }

    /// Period encoded in a remote file name such as
    /// `MI4.CUR.WDAI_UDAI.DAILY.2023-01-01.txt.zip`: the first
    /// dot-separated segment that reads as a timestamp.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.split('.')
            .find_map(|segment| Self::parse(segment, None).ok())
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start.max(other.start) <= self.end.min(other.end)
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Granularity slots touched by this period, ascending.
    pub fn slots(&self, granularity: Granularity) -> Vec<NaiveDateTime> {
        let mut slots = Vec::new();
        let mut slot = granularity.floor(self.start);
        while slot <= self.end {
            slots.push(slot);
            slot += granularity.step();
        }
        slots
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
