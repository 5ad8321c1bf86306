//! Turning a request into remote paths.
//!
//! `plan` is pure: it renders the template and never touches the network.
//! `resolve` finishes the job against an open session for templates that
//! name directories rather than individual files, and `detect_template`
//! sniffs the layout when the request does not name one.

use super::provider::{FetchError, RemoteSession};
use crate::domain::{Bucket, Period};
use crate::error::ConfigError;
use crate::request::{DownloadRequest, MissingFilePolicy};
use crate::template::{Template, TemplateVars};
use serde::Serialize;
use std::collections::HashSet;

/// Remote locations a request maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// One path per bucket and granularity slot.
    Files(Vec<String>),
    /// Directories, one per bucket, whose entries are filtered by the
    /// period in their names.
    Listing { dirs: Vec<String> },
}

impl Plan {
    /// Paths known without listing anything.
    pub fn paths(&self) -> Vec<String> {
        match self {
            Plan::Files(paths) => paths.clone(),
            Plan::Listing { dirs } => dirs.clone(),
        }
    }
}

/// Files a plan resolved to on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Selected files, bucket by bucket, each bucket ordered by period.
    pub paths: Vec<String>,
    /// Directories that were expected but absent, or that held nothing
    /// for the period (skip policy only).
    pub missing: Vec<String>,
}

/// Derive the remote paths for `request`. Deterministic and I/O free.
///
/// Fails for requests that detect their layout on the server.
pub fn plan(request: &DownloadRequest) -> Result<Plan, FetchError> {
    match &request.template {
        Some(template) => plan_with(request, template),
        None => Err(ConfigError::Template {
            template: String::new(),
            reason: "layout is detected on the server; there is nothing to plan offline".into(),
        }
        .into()),
    }
}

/// Derive the remote paths for `request` laid out by `template`.
pub fn plan_with(request: &DownloadRequest, template: &Template) -> Result<Plan, FetchError> {
    let prefix = request.effective_prefix();
    let buckets: Vec<Option<Bucket>> = if template.mentions_bucket() {
        Bucket::expand(&request.buckets).into_iter().map(Some).collect()
    } else {
        if !request.buckets.is_empty() {
            tracing::warn!("template {template} has no {{bucket}}; bucket selection ignored");
        }
        vec![None]
    };
    let vars = |bucket, slot| TemplateVars {
        prefix: &prefix,
        asset_class: request.asset_class,
        frequency: request.frequency,
        bucket,
        slot,
    };

    // Coarse templates (e.g. only `{year}`) map many slots to one path.
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    if !template.is_dated() {
        for bucket in buckets {
            let dir = template.render(&vars(bucket, None))?;
            if seen.insert(dir.clone()) {
                paths.push(dir);
            }
        }
        tracing::debug!("listing mode: {}", paths.join(", "));
        return Ok(Plan::Listing { dirs: paths });
    }

    let slots = request.period.slots(request.frequency.granularity());
    for bucket in buckets {
        for slot in &slots {
            let path = template.render(&vars(bucket, Some(*slot)))?;
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
    }
    tracing::debug!("{} paths for {}", paths.len(), request.period);
    Ok(Plan::Files(paths))
}

/// Work out the server layout from the first recognisable folder in the
/// account's home directory.
pub fn detect_template(session: &dyn RemoteSession) -> Result<Template, FetchError> {
    let entries = match session.list_dir(".") {
        Ok(entries) => entries,
        Err(FetchError::NotFound { .. }) => Vec::new(),
        Err(e) => return Err(e),
    };
    if entries.is_empty() {
        return Err(FetchError::Layout("empty root folder".into()));
    }
    let template = entries
        .iter()
        .filter(|e| e.is_dir)
        .find_map(|e| Template::for_root_entry(&e.name))
        .ok_or_else(|| {
            let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            FetchError::Layout(format!("unrecognised root entries: {}", names.join(", ")))
        })?;
    tracing::info!("detected layout {template}");
    Ok(template)
}

/// Concrete file paths for `plan`.
///
/// Listing plans read each directory and keep files whose name-encoded
/// period overlaps the request, ordered by that period's start. A folder
/// that is absent counts as missing when it was asked for, either by
/// naming its bucket or by being the only one. A selection that finds
/// nothing at all always goes through the missing-file policy.
pub fn resolve(
    session: &dyn RemoteSession,
    plan: &Plan,
    request: &DownloadRequest,
) -> Result<Resolved, FetchError> {
    let dirs = match plan {
        Plan::Files(paths) => {
            return Ok(Resolved {
                paths: paths.clone(),
                missing: Vec::new(),
            })
        }
        Plan::Listing { dirs } => dirs,
    };
    let required = !request.buckets.is_empty() || dirs.len() == 1;

    let mut resolved = Resolved::default();
    for dir in dirs {
        let entries = match session.list_dir(dir) {
            Ok(entries) => entries,
            Err(FetchError::NotFound { path }) if required => {
                match request.missing {
                    MissingFilePolicy::Skip => {
                        tracing::warn!("remote directory not found: {path}");
                        resolved.missing.push(path);
                    }
                    MissingFilePolicy::Fail => return Err(FetchError::NotFound { path }),
                }
                continue;
            }
            Err(FetchError::NotFound { path }) => {
                tracing::debug!("no folder {path}");
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut selected: Vec<(Period, String)> = entries
            .into_iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| match Period::from_file_name(&e.name) {
                Some(p) => Some((p, e.name)),
                None => {
                    tracing::debug!("ignoring {}: no date in name", e.name);
                    None
                }
            })
            .filter(|(p, _)| p.overlaps(&request.period))
            .collect();
        selected.sort_by(|a, b| a.0.start().cmp(&b.0.start()).then_with(|| a.1.cmp(&b.1)));
        tracing::info!("found {} files in {dir}", selected.len());

        let dir = dir.trim_end_matches('/');
        resolved
            .paths
            .extend(selected.into_iter().map(|(_, name)| format!("{dir}/{name}")));
    }

    if resolved.paths.is_empty() {
        let searched = dirs.join(", ");
        match request.missing {
            MissingFilePolicy::Skip => {
                tracing::warn!("no files within {} in {searched}", request.period);
                if resolved.missing.is_empty() {
                    resolved.missing.extend(dirs.iter().cloned());
                }
            }
            MissingFilePolicy::Fail => return Err(FetchError::NotFound { path: searched }),
        }
    }
    Ok(resolved)
}
