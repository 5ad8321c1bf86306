//! Validation errors raised before any network activity.

use thiserror::Error;

/// A request that can never succeed, whatever the remote side holds.
///
/// Every variant is detected while building or validating a request, so
/// callers can treat these as non-retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown asset class '{0}'")]
    UnknownAssetClass(String),

    #[error("unknown frequency '{0}'")]
    UnknownFrequency(String),

    #[error("unknown bucket '{0}' (expected one of: monthly, daily, minutely)")]
    UnknownBucket(String),

    #[error("unknown source '{0}' (expected one of: News, Social, News_Social)")]
    UnknownSource(String),

    #[error("can't parse timestamp '{0}', expecting format yyyy(-?mm(-?dd(-?HHMM)?)?)?")]
    InvalidTimestamp(String),

    #[error("period start {start} is after end {end}")]
    InvertedPeriod { start: String, end: String },

    #[error("template error in '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("config file error: {0}")]
    File(String),
}
