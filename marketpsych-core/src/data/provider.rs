//! Transport traits and structured error types.
//!
//! The `Connector` trait abstracts over where remote files come from (the
//! SFTP endpoint, an in-memory tree in tests) so the download orchestrator
//! never touches a socket directly and can be driven by a fake.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for fetch operations.
///
/// These are designed to be displayable in the CLI and to tell callers
/// which failures are worth retrying.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("remote file not found: {path}")]
    NotFound { path: String },

    #[error("malformed file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("can't detect remote layout: {0}")]
    Layout(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table error: {0}")]
    Table(String),
}

impl FetchError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Network and credential failures may clear up on their own;
    /// everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Authentication(_))
    }

    /// Errors that abort the whole call rather than a single file.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FetchError::Parse { .. } | FetchError::NotFound { .. })
    }
}

/// A remote directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// File name, without directory.
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// An open connection. Dropping it closes the connection.
pub trait RemoteSession {
    /// Entries of a remote directory, in server order.
    fn list_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Metadata of a single remote path.
    fn stat(&self, path: &str) -> Result<RemoteEntry, FetchError>;

    /// Full contents of a remote file.
    fn read(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Opens sessions against one endpoint with one set of credentials.
///
/// Implementations hold the credentials; the orchestrator only asks for
/// a session when it is about to do I/O.
pub trait Connector: Send + Sync {
    /// Human-readable name of this transport.
    fn name(&self) -> &str;

    fn connect(&self) -> Result<Box<dyn RemoteSession>, FetchError>;
}

/// Progress callback for multi-file operations.
pub trait FetchProgress: Send + Sync {
    /// Called when starting to fetch a remote file.
    fn on_start(&self, path: &str, index: usize, total: usize);

    /// Called when a file fetch completes or fails.
    fn on_complete(&self, path: &str, index: usize, total: usize, result: Result<(), &FetchError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, path: &str, index: usize, total: usize) {
        tracing::info!("[{}/{}] getting {path}", index + 1, total);
    }

    fn on_complete(&self, path: &str, _index: usize, _total: usize, result: Result<(), &FetchError>) {
        match result {
            Ok(()) => tracing::debug!("done: {path}"),
            Err(e) => tracing::warn!("{path}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        if total == 0 {
            tracing::warn!("no files found within time range");
        } else {
            tracing::info!("processed {total} files: {succeeded} succeeded, {failed} failed");
        }
    }
}

/// Progress reporter that stays quiet.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_start(&self, _path: &str, _index: usize, _total: usize) {}

    fn on_complete(&self, _path: &str, _index: usize, _total: usize, _result: Result<(), &FetchError>) {}

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}
