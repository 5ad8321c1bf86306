use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time-bucket directory under an asset class and frequency.
///
/// The provider splits each feed into `monthly`, `daily` and `minutely`
/// folders. A non-empty bucket list restricts the search to those folders;
/// an empty one searches all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Monthly,
    Daily,
    Minutely,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Monthly, Bucket::Daily, Bucket::Minutely];

    /// Directory name on the server.
    pub fn token(&self) -> &'static str {
        match self {
            Bucket::Monthly => "monthly",
            Bucket::Daily => "daily",
            Bucket::Minutely => "minutely",
        }
    }

    /// Parse a list of tokens, failing on the first unknown one.
    pub fn parse_all<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Bucket>, ConfigError> {
        let mut buckets = Vec::with_capacity(tokens.len());
        for token in tokens {
            let bucket: Bucket = token.as_ref().parse()?;
            if !buckets.contains(&bucket) {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    /// Folders to search: `buckets`, or every bucket when it is empty.
    pub fn expand(buckets: &[Bucket]) -> Vec<Bucket> {
        if buckets.is_empty() {
            Bucket::ALL.to_vec()
        } else {
            buckets.to_vec()
        }
    }

    /// Exact directory-name match, as used when sniffing a server layout.
    pub fn from_dir_name(name: &str) -> Option<Bucket> {
        Bucket::ALL.into_iter().find(|b| b.token() == name)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Bucket {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Bucket::ALL
            .into_iter()
            .find(|b| b.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| ConfigError::UnknownBucket(s.to_string()))
    }
}
