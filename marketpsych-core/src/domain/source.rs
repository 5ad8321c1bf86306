use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content source of a record, carried in the `dataType` column.
///
/// A non-empty source list keeps only records from the named sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    News,
    Social,
    #[serde(rename = "News_Social")]
    NewsSocial,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::News, Source::Social, Source::NewsSocial];

    /// Value of the `dataType` column for this source.
    pub fn token(&self) -> &'static str {
        match self {
            Source::News => "News",
            Source::Social => "Social",
            Source::NewsSocial => "News_Social",
        }
    }

    pub fn parse_all<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Source>, ConfigError> {
        let mut sources = Vec::with_capacity(tokens.len());
        for token in tokens {
            let source: Source = token.as_ref().parse()?;
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    /// Whether a record with this `dataType` value passes `sources`.
    /// An empty filter admits everything.
    pub fn admits(sources: &[Source], data_type: Option<&str>) -> bool {
        if sources.is_empty() {
            return true;
        }
        match data_type {
            Some(dt) => sources.iter().any(|s| s.token().eq_ignore_ascii_case(dt)),
            None => false,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['-', ' '], "_");
        Source::ALL
            .into_iter()
            .find(|src| src.token().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ConfigError::UnknownSource(s.to_string()))
    }
}
