use crate::error::ConfigError;
use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Window length and update frequency of a feed, e.g. `WDAI_UDAI` is a
/// one-day window refreshed daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "W365_UDAI")]
    W365Udai,
    #[serde(rename = "WDAI_UDAI")]
    WdaiUdai,
    #[serde(rename = "WDAI_UHOU")]
    WdaiUhou,
    #[serde(rename = "W01M_U01M")]
    W01mU01m,
}

/// How much time one remote file covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Day,
    Hour,
}

impl Granularity {
    /// Start of the slot containing `t`.
    pub fn floor(&self, t: NaiveDateTime) -> NaiveDateTime {
        match self {
            Granularity::Day => t.date().and_time(chrono::NaiveTime::MIN),
            Granularity::Hour => t
                .date()
                .and_hms_opt(t.hour(), 0, 0)
                .unwrap_or(t),
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Granularity::Day => Duration::days(1),
            Granularity::Hour => Duration::hours(1),
        }
    }

    /// Date token used in file names: `2023-01-01` or `2023-01-01-1300`.
    pub fn format(&self, slot: NaiveDateTime) -> String {
        match self {
            Granularity::Day => slot.format("%Y-%m-%d").to_string(),
            Granularity::Hour => slot.format("%Y-%m-%d-%H%M").to_string(),
        }
    }
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::W365Udai,
        Frequency::WdaiUdai,
        Frequency::WdaiUhou,
        Frequency::W01mU01m,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Frequency::W365Udai => "W365_UDAI",
            Frequency::WdaiUdai => "WDAI_UDAI",
            Frequency::WdaiUhou => "WDAI_UHOU",
            Frequency::W01mU01m => "W01M_U01M",
        }
    }

    /// Daily updates ship one file per day, intraday updates one per hour.
    pub fn granularity(&self) -> Granularity {
        match self {
            Frequency::W365Udai | Frequency::WdaiUdai => Granularity::Day,
            Frequency::WdaiUhou | Frequency::W01mU01m => Granularity::Hour,
        }
    }

    /// The yearly-window feed lives under a `_COR` asset-class directory.
    pub fn asset_class_suffix(&self) -> &'static str {
        match self {
            Frequency::W365Udai => "_COR",
            _ => "",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let alias = match upper.as_str() {
            "DAILY" => Some(Frequency::WdaiUdai),
            "HOURLY" => Some(Frequency::WdaiUhou),
            "MINUTE" | "MINUTELY" => Some(Frequency::W01mU01m),
            "ANNUAL" | "YEARLY" => Some(Frequency::W365Udai),
            _ => None,
        };
        alias
            .or_else(|| Frequency::ALL.into_iter().find(|f| f.code() == upper))
            .ok_or_else(|| ConfigError::UnknownFrequency(s.to_string()))
    }
}
