//! Download orchestrator: plan, fetch over one session, parse, deliver.

use super::archive;
use super::plan::{self, Plan};
use super::provider::{Connector, FetchError, FetchProgress, RemoteSession};
use super::table::RmaTable;
use crate::request::{DownloadRequest, MissingFilePolicy, OutputMode, RequestParams};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A remote file selected by a `List` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFile {
    pub path: String,
    pub size: u64,
}

/// What a download produced.
#[derive(Debug)]
pub enum Output {
    Table(RmaTable),
    /// Local files written for `OutputMode::Directory`, in remote order.
    Files(Vec<PathBuf>),
    File(PathBuf),
    Listing(Vec<RemoteFile>),
}

impl Output {
    pub fn table(&self) -> Option<&RmaTable> {
        match self {
            Output::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<RmaTable> {
        match self {
            Output::Table(t) => Some(t),
            _ => None,
        }
    }
}

/// Per-call accounting.
#[derive(Debug, Default, Serialize)]
pub struct DownloadReport {
    /// Remote files the request resolved to.
    pub selected: usize,
    /// Files transferred.
    pub fetched: usize,
    /// Selected paths that did not exist (skip policy only).
    pub missing: Vec<String>,
    /// Files that were fetched but could not be used.
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<(String, FetchError)>,
    /// BLAKE3 of each fetched file as transferred, by remote path.
    pub digests: BTreeMap<String, String>,
}

fn serialize_failures<S: Serializer>(
    failures: &[(String, FetchError)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let rendered: BTreeMap<&str, String> = failures
        .iter()
        .map(|(path, e)| (path.as_str(), e.to_string()))
        .collect();
    rendered.serialize(serializer)
}

impl DownloadReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.missing.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub output: Output,
    pub report: DownloadReport,
}

impl DownloadOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.report.all_succeeded()
    }
}

/// A fetched file before parsing.
struct Fetched {
    path: String,
    file_name: String,
    bytes: Vec<u8>,
}

/// A fetched file that parsed.
struct Parsed {
    path: String,
    file_name: String,
    bytes: Vec<u8>,
    table: RmaTable,
}

/// Runs requests against one connector.
pub struct Fetcher<'a> {
    connector: &'a dyn Connector,
}

impl<'a> Fetcher<'a> {
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self { connector }
    }

    /// Run `request`. Opens a single session, which is released before
    /// this returns on every path.
    pub fn download(
        &self,
        request: &DownloadRequest,
        progress: &dyn FetchProgress,
    ) -> Result<DownloadOutcome, FetchError> {
        let planned = match &request.template {
            Some(template) => Some(plan::plan_with(request, template)?),
            None => None,
        };
        let mut report = DownloadReport::default();

        let session = self.connector.connect()?;
        tracing::debug!("session open via {}", self.connector.name());
        let plan = match planned {
            Some(plan) => plan,
            None => plan::plan_with(request, &plan::detect_template(&*session)?)?,
        };
        let resolved = plan::resolve(&*session, &plan, request)?;
        let paths = resolved.paths;
        report.selected = paths.len();
        report.missing = resolved.missing;

        if request.output == OutputMode::List {
            let listing = list_files(&*session, &paths, request, &mut report)?;
            drop(session);
            progress.on_batch_complete(listing.len(), report.missing.len(), paths.len());
            return Ok(DownloadOutcome {
                output: Output::Listing(listing),
                report,
            });
        }

        let fetched = fetch_all(&*session, &paths, request, progress, &mut report)?;
        drop(session);

        let (parsed, failures) = parse_all(fetched);
        for (path, e) in &failures {
            tracing::warn!("skipping {path}: {e}");
        }
        report.failures.extend(failures);

        let output = deliver(request, &paths, parsed, &mut report)?;
        progress.on_batch_complete(
            report.fetched.saturating_sub(report.failures.len()),
            report.failures.len() + report.missing.len(),
            report.selected,
        );
        Ok(DownloadOutcome { output, report })
    }

    /// Resolve paths only; no transfers.
    pub fn plan(&self, request: &DownloadRequest) -> Result<Plan, FetchError> {
        plan::plan(request)
    }
}

/// Validate `params` and run them. Invalid parameters fail before any
/// connection is attempted.
pub fn download(
    connector: &dyn Connector,
    params: &RequestParams,
    progress: &dyn FetchProgress,
) -> Result<DownloadOutcome, FetchError> {
    let request = params.to_request()?;
    Fetcher::new(connector).download(&request, progress)
}

fn handle_missing(
    path: &str,
    policy: MissingFilePolicy,
    report: &mut DownloadReport,
) -> Result<(), FetchError> {
    match policy {
        MissingFilePolicy::Skip => {
            tracing::warn!("remote file not found, skipping: {path}");
            report.missing.push(path.to_string());
            Ok(())
        }
        MissingFilePolicy::Fail => Err(FetchError::NotFound {
            path: path.to_string(),
        }),
    }
}

fn list_files(
    session: &dyn RemoteSession,
    paths: &[String],
    request: &DownloadRequest,
    report: &mut DownloadReport,
) -> Result<Vec<RemoteFile>, FetchError> {
    let mut listing = Vec::with_capacity(paths.len());
    for path in paths {
        match session.stat(path) {
            Ok(entry) => listing.push(RemoteFile {
                path: path.clone(),
                size: entry.size,
            }),
            Err(FetchError::NotFound { .. }) => handle_missing(path, request.missing, report)?,
            Err(e) => return Err(e),
        }
    }
    Ok(listing)
}

/// Transfer every path in order. Missing files follow the request's
/// policy, bad archives are recorded, anything else aborts.
fn fetch_all(
    session: &dyn RemoteSession,
    paths: &[String],
    request: &DownloadRequest,
    progress: &dyn FetchProgress,
    report: &mut DownloadReport,
) -> Result<Vec<Fetched>, FetchError> {
    let total = paths.len();
    let mut fetched = Vec::with_capacity(total);

    for (i, path) in paths.iter().enumerate() {
        progress.on_start(path, i, total);
        let bytes = match session.read(path) {
            Ok(bytes) => bytes,
            Err(e @ FetchError::NotFound { .. }) => {
                progress.on_complete(path, i, total, Err(&e));
                handle_missing(path, request.missing, report)?;
                continue;
            }
            Err(e) => {
                progress.on_complete(path, i, total, Err(&e));
                return Err(e);
            }
        };

        report.fetched += 1;
        report
            .digests
            .insert(path.clone(), blake3::hash(&bytes).to_hex().to_string());

        match archive::unpack(path, bytes) {
            Ok(unpacked) => {
                progress.on_complete(path, i, total, Ok(()));
                fetched.push(Fetched {
                    path: path.clone(),
                    file_name: unpacked.file_name,
                    bytes: unpacked.bytes,
                });
            }
            Err(e) => {
                progress.on_complete(path, i, total, Err(&e));
                report.failures.push((path.clone(), e));
            }
        }
    }
    Ok(fetched)
}

/// Parse fetched files on the rayon pool. Output order matches input
/// order, which is chronological.
fn parse_all(fetched: Vec<Fetched>) -> (Vec<Parsed>, Vec<(String, FetchError)>) {
    let results: Vec<Result<Parsed, (String, FetchError)>> = fetched
        .into_par_iter()
        .map(|f| match RmaTable::parse(&f.path, &f.bytes) {
            Ok(table) => Ok(Parsed {
                path: f.path,
                file_name: f.file_name,
                bytes: f.bytes,
                table,
            }),
            Err(e) => Err((f.path, e)),
        })
        .collect();

    let mut parsed = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(p) => parsed.push(p),
            Err(f) => failures.push(f),
        }
    }
    (parsed, failures)
}

fn deliver(
    request: &DownloadRequest,
    selected: &[String],
    parsed: Vec<Parsed>,
    report: &mut DownloadReport,
) -> Result<Output, FetchError> {
    match &request.output {
        OutputMode::Table => Ok(Output::Table(assemble(parsed, request))),
        OutputMode::Directory(dir) => {
            write_directory(dir, selected, parsed, request, report).map(Output::Files)
        }
        OutputMode::File(path) if request.output.is_parquet() => {
            ensure_parent(path)?;
            assemble(parsed, request).write_parquet(path)?;
            tracing::info!("wrote {}", path.display());
            Ok(Output::File(path.clone()))
        }
        OutputMode::File(path) => {
            ensure_parent(path)?;
            let bytes = if request.sources.is_empty() && same_header(&parsed) {
                concat_tsv(&parsed)
            } else {
                assemble(parsed, request).to_tsv()?
            };
            write_atomic(path, &bytes)?;
            tracing::info!("wrote {}", path.display());
            Ok(Output::File(path.clone()))
        }
        OutputMode::List => Err(FetchError::Table("list output has no table".into())),
    }
}

fn assemble(parsed: Vec<Parsed>, request: &DownloadRequest) -> RmaTable {
    let mut table = RmaTable::concat(parsed.into_iter().map(|p| p.table));
    table.retain_sources(&request.sources);
    tracing::info!("{} records from {} assets", table.len(), table.assets().len());
    table
}

/// Number of leading directory segments every path in `paths` shares.
fn shared_dir_depth(paths: &[String]) -> usize {
    let mut iter = paths.iter().map(|p| p.split('/').collect::<Vec<_>>());
    let Some(first) = iter.next() else {
        return 0;
    };
    let mut depth = first.len() - 1;
    for segments in iter {
        depth = first[..depth]
            .iter()
            .zip(&segments[..segments.len() - 1])
            .take_while(|(a, b)| a == b)
            .count();
    }
    depth
}

/// Where `remote` lands under `dir`: the remote path below the shared
/// directory, with the file name replaced by the unpacked one.
fn local_path(dir: &Path, remote: &str, depth: usize, file_name: &str) -> PathBuf {
    let segments: Vec<&str> = remote.split('/').collect();
    let mut local = dir.to_path_buf();
    let parents = &segments[depth.min(segments.len() - 1)..segments.len() - 1];
    for segment in parents {
        if !matches!(*segment, "" | "." | "..") {
            local.push(segment);
        }
    }
    local.push(file_name);
    local
}

/// One local file per remote file, mirroring the remote tree below the
/// directory all selected files share. A second remote file mapping to an
/// already written local path is recorded as a failure.
fn write_directory(
    dir: &Path,
    selected: &[String],
    parsed: Vec<Parsed>,
    request: &DownloadRequest,
    report: &mut DownloadReport,
) -> Result<Vec<PathBuf>, FetchError> {
    fs::create_dir_all(dir).map_err(|e| FetchError::io(dir.display().to_string(), e))?;
    let depth = shared_dir_depth(selected);
    let mut written: Vec<PathBuf> = Vec::with_capacity(parsed.len());
    let mut taken = HashSet::new();

    for mut p in parsed {
        let local = local_path(dir, &p.path, depth, &p.file_name);
        if !taken.insert(local.clone()) {
            let e = FetchError::io(
                local.display().to_string(),
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "an earlier remote file was written to the same local path",
                ),
            );
            tracing::warn!("{}: {e}", p.path);
            report.failures.push((p.path, e));
            continue;
        }

        ensure_parent(&local)?;
        if request.sources.is_empty() {
            write_atomic(&local, &p.bytes)?;
        } else {
            p.table.retain_sources(&request.sources);
            write_atomic(&local, &p.table.to_tsv()?)?;
        }
        tracing::info!("{} -> {}", p.path, local.display());
        written.push(local);
    }
    Ok(written)
}

/// Header line and body of a TSV file, without BOM or trailing CR.
fn split_header(bytes: &[u8]) -> (&[u8], &[u8]) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let (head, body) = match bytes.iter().position(|&b| b == b'\n') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (bytes, &[][..]),
    };
    (head.strip_suffix(b"\r").unwrap_or(head), body)
}

fn same_header(parsed: &[Parsed]) -> bool {
    let mut heads = parsed.iter().map(|p| split_header(&p.bytes).0);
    match heads.next() {
        Some(first) => heads.all(|h| h == first),
        None => true,
    }
}

/// Join TSV bodies under the shared header, byte for byte.
fn concat_tsv(parsed: &[Parsed]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for (i, p) in parsed.iter().enumerate() {
        let (head, body) = split_header(&p.bytes);
        if i == 0 {
            out.extend_from_slice(head);
            out.push(b'\n');
        }
        out.extend_from_slice(body);
        if !body.is_empty() && !body.ends_with(b"\n") {
            out.push(b'\n');
        }
    }
    out
}

fn ensure_parent(path: &Path) -> Result<(), FetchError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| FetchError::io(parent.display().to_string(), e)),
        _ => Ok(()),
    }
}

/// Write to a `.tmp` sibling and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let display = path.display().to_string();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| FetchError::io(&display, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        FetchError::io(&display, e)
    })
}
