//! Remote path templates.
//!
//! A template is a string with `{placeholder}` tokens, e.g.
//! `{prefix}/{asset_class}/{frequency}/{bucket}`. Literal braces are
//! written `{{` and `}}`.
//!
//! Templates that mention a date placeholder name one remote file per
//! granularity slot. Templates without one name a directory whose listing
//! is filtered by the period encoded in each file name.

use crate::domain::{AssetClass, Bucket, Frequency, Granularity};
use crate::error::ConfigError;
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

/// The provider's delivery layout: one folder per time bucket.
pub const DEFAULT_TEMPLATE: &str = "{prefix}/{asset_class}/{frequency}/{bucket}";

pub const DEFAULT_PREFIX: &str = "/mrn-mi-w/PRO/MI4";

/// Layouts recognised from the first folder of an account's home
/// directory. They are relative to that directory and ignore the prefix.
const DETECTED_LAYOUTS: [(RootKind, &str); 3] = [
    (RootKind::Frequency, "{frequency}/{bucket}"),
    (RootKind::AssetClass, "{asset_class}/{frequency}/{bucket}"),
    (RootKind::Bucket, "{bucket}"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Frequency,
    AssetClass,
    Bucket,
}

impl RootKind {
    fn matches(&self, name: &str) -> bool {
        match self {
            RootKind::Frequency => Frequency::ALL.iter().any(|f| f.code() == name),
            RootKind::AssetClass => AssetClass::ALL.iter().any(|a| a.code() == name),
            RootKind::Bucket => Bucket::from_dir_name(name).is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Prefix,
    AssetClass,
    Frequency,
    Bucket,
    Date,
    Year,
    Month,
    Day,
    Hour,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "prefix" => Placeholder::Prefix,
            "asset_class" => Placeholder::AssetClass,
            "frequency" => Placeholder::Frequency,
            "bucket" => Placeholder::Bucket,
            "date" => Placeholder::Date,
            "year" => Placeholder::Year,
            "month" => Placeholder::Month,
            "day" => Placeholder::Day,
            "hour" => Placeholder::Hour,
            _ => return None,
        })
    }

    fn is_date(&self) -> bool {
        matches!(
            self,
            Placeholder::Date | Placeholder::Year | Placeholder::Month | Placeholder::Day | Placeholder::Hour
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed, validated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub prefix: &'a str,
    pub asset_class: AssetClass,
    pub frequency: Frequency,
    /// Required when the template mentions `{bucket}`.
    pub bucket: Option<Bucket>,
    /// Slot start; required when the template is dated.
    pub slot: Option<NaiveDateTime>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let fail = |reason: &str| ConfigError::Template {
            template: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.trim().is_empty() {
            return Err(fail("template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(fail("unbalanced '{'")),
                            Some(ch) => name.push(ch),
                        }
                    }
                    let placeholder = Placeholder::from_name(name.trim())
                        .ok_or_else(|| fail(&format!("unknown placeholder '{{{name}}}'")))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(placeholder));
                }
                '}' => return Err(fail("unbalanced '}'")),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether rendering needs a slot, i.e. the template names files.
    pub fn is_dated(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(p) if p.is_date()))
    }

    pub fn mentions_bucket(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(Placeholder::Bucket)))
    }

    /// Layout implied by the first entry of an account's home directory,
    /// e.g. a `WDAI_UDAI` folder means `{frequency}/{bucket}`.
    pub fn for_root_entry(name: &str) -> Option<Template> {
        DETECTED_LAYOUTS
            .iter()
            .find(|(kind, _)| kind.matches(name))
            .and_then(|(_, raw)| Template::parse(raw).ok())
    }

    /// Render to a remote path. Repeated slashes are collapsed.
    pub fn render(&self, vars: &TemplateVars<'_>) -> Result<String, ConfigError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(p) => {
                    let value = match p {
                        Placeholder::Prefix => vars.prefix.to_string(),
                        Placeholder::AssetClass => format!(
                            "{}{}",
                            vars.asset_class.code(),
                            vars.frequency.asset_class_suffix()
                        ),
                        Placeholder::Frequency => vars.frequency.code().to_string(),
                        Placeholder::Bucket => vars
                            .bucket
                            .ok_or_else(|| ConfigError::Template {
                                template: self.raw.clone(),
                                reason: "{bucket} rendered without a bucket".into(),
                            })?
                            .token()
                            .to_string(),
                        date_field => {
                            let slot = vars.slot.ok_or_else(|| ConfigError::Template {
                                template: self.raw.clone(),
                                reason: "date placeholder rendered without a slot".into(),
                            })?;
                            render_date(*date_field, slot, vars.frequency.granularity())
                        }
                    };
                    out.push_str(&value);
                }
            }
        }
        Ok(collapse_slashes(&out))
    }
}

fn render_date(field: Placeholder, slot: NaiveDateTime, granularity: Granularity) -> String {
    match field {
        Placeholder::Year => slot.format("%Y").to_string(),
        Placeholder::Month => slot.format("%m").to_string(),
        Placeholder::Day => slot.format("%d").to_string(),
        Placeholder::Hour => slot.format("%H").to_string(),
        _ => granularity.format(slot),
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

impl Default for Template {
    fn default() -> Self {
        Template::parse(DEFAULT_TEMPLATE).expect("default template is valid")
    }
}

impl FromStr for Template {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
