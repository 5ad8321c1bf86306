//! What to download and where to put it.

use crate::domain::{AssetClass, Bucket, Frequency, Period, Source};
use crate::error::ConfigError;
use crate::template::{Template, DEFAULT_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where fetched data ends up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Parse everything into one in-memory table.
    #[default]
    Table,
    /// One local file per remote source, inside this directory.
    Directory(PathBuf),
    /// One local file holding every record. A `.parquet` extension writes
    /// Parquet, anything else tab-separated text.
    File(PathBuf),
    /// Resolve and stat the remote files without downloading them.
    List,
}

impl OutputMode {
    /// Map a command-line style target: a trailing `/` or an existing
    /// directory means `Directory`, anything else `File`.
    pub fn from_target(target: &str) -> Self {
        let path = PathBuf::from(target);
        if target.ends_with('/') || path.is_dir() {
            OutputMode::Directory(path)
        } else {
            OutputMode::File(path)
        }
    }

    pub fn is_parquet(&self) -> bool {
        match self {
            OutputMode::File(p) => p
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("parquet")),
            _ => false,
        }
    }
}

/// What to do when a selected remote file does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFilePolicy {
    /// Log a warning and return whatever was found.
    #[default]
    Skip,
    /// Abort with a not-found error.
    Fail,
}

/// A validated download request.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub asset_class: AssetClass,
    pub frequency: Frequency,
    pub period: Period,
    pub output: OutputMode,
    /// Time-bucket folders to search; empty searches all of them.
    pub buckets: Vec<Bucket>,
    /// Record filter on `dataType`; empty keeps everything.
    pub sources: Vec<Source>,
    /// Remote layout. `None` sniffs it from the server after connecting.
    pub template: Option<Template>,
    pub prefix: String,
    /// Trial accounts see the same tree under `<prefix>/TRIAL`.
    pub trial: bool,
    pub missing: MissingFilePolicy,
}

impl DownloadRequest {
    pub fn new(asset_class: AssetClass, frequency: Frequency, period: Period) -> Self {
        Self {
            asset_class,
            frequency,
            period,
            output: OutputMode::default(),
            buckets: Vec::new(),
            sources: Vec::new(),
            template: Some(Template::default()),
            prefix: DEFAULT_PREFIX.to_string(),
            trial: false,
            missing: MissingFilePolicy::default(),
        }
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn buckets(mut self, buckets: Vec<Bucket>) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// Work the layout out from the account's home directory instead of
    /// using a template.
    pub fn detect_layout(mut self) -> Self {
        self.template = None;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn trial(mut self, trial: bool) -> Self {
        self.trial = trial;
        self
    }

    pub fn missing(mut self, missing: MissingFilePolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Prefix actually used when rendering paths.
    pub fn effective_prefix(&self) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if self.trial {
            format!("{prefix}/TRIAL")
        } else {
            prefix.to_string()
        }
    }
}

/// An unvalidated request, as it arrives from a caller holding strings.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub asset_class: String,
    pub frequency: String,
    pub start: String,
    /// Defaults to the end of the period `start` names.
    pub end: Option<String>,
    pub output: OutputMode,
    pub buckets: Vec<String>,
    pub sources: Vec<String>,
    /// `None` uses the default layout; an empty string detects it.
    pub template: Option<String>,
    pub prefix: Option<String>,
    pub trial: bool,
    pub missing: MissingFilePolicy,
}

impl RequestParams {
    pub fn new(
        asset_class: impl Into<String>,
        frequency: impl Into<String>,
        start: impl Into<String>,
        end: Option<&str>,
    ) -> Self {
        Self {
            asset_class: asset_class.into(),
            frequency: frequency.into(),
            start: start.into(),
            end: end.map(str::to_string),
            ..Self::default()
        }
    }

    /// Validate every field. Nothing here touches the network.
    pub fn to_request(&self) -> Result<DownloadRequest, ConfigError> {
        let asset_class: AssetClass = self.asset_class.parse()?;
        let frequency: Frequency = self.frequency.parse()?;
        let period = Period::parse(&self.start, self.end.as_deref())?;
        let buckets = Bucket::parse_all(&self.buckets)?;
        let sources = Source::parse_all(&self.sources)?;

        let mut request = DownloadRequest::new(asset_class, frequency, period)
            .output(self.output.clone())
            .buckets(buckets)
            .sources(sources)
            .trial(self.trial)
            .missing(self.missing);
        request = match self.template.as_deref().map(str::trim) {
            Some("") => request.detect_layout(),
            Some(raw) => request.template(Template::parse(raw)?),
            None => request,
        };
        if let Some(prefix) = &self.prefix {
            request = request.prefix(prefix.clone());
        }
        Ok(request)
    }
}
