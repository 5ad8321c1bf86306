//! In-memory transport.
//!
//! Holds a remote file tree in a map and counts sessions, so tests can
//! assert how many connections a call opened and that every one of them
//! was released.

use super::provider::{Connector, FetchError, RemoteEntry, RemoteSession};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    open_now: AtomicUsize,
    reads: AtomicUsize,
}

/// How `connect` should behave.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectMode {
    Accept,
    RejectCredentials,
    Unreachable,
}

/// Remote file tree kept in memory.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    counters: Arc<Counters>,
    mode: ConnectMode,
    deny_reads: Arc<Mutex<Vec<String>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(BTreeMap::new())),
            counters: Arc::new(Counters::default()),
            mode: ConnectMode::Accept,
            deny_reads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add or replace a file. Parent directories exist implicitly.
    pub fn with_file(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), contents.into());
    }

    /// Every `connect` fails as if the key were rejected.
    pub fn rejecting_credentials(mut self) -> Self {
        self.mode = ConnectMode::RejectCredentials;
        self
    }

    /// Every `connect` fails as if the host were down.
    pub fn unreachable(mut self) -> Self {
        self.mode = ConnectMode::Unreachable;
        self
    }

    /// Reads of `path` fail with an authentication error (access revoked
    /// mid-session).
    pub fn deny_read(self, path: impl Into<String>) -> Self {
        self.deny_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.into());
        self
    }

    /// Sessions opened so far.
    pub fn connections_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet dropped.
    pub fn connections_open(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    /// Successful file reads so far.
    pub fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, FetchError> {
        match self.mode {
            ConnectMode::RejectCredentials => {
                return Err(FetchError::Authentication("public key rejected".into()))
            }
            ConnectMode::Unreachable => {
                return Err(FetchError::Network("connection refused".into()))
            }
            ConnectMode::Accept => {}
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.open_now.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            files: Arc::clone(&self.files),
            counters: Arc::clone(&self.counters),
            deny_reads: Arc::clone(&self.deny_reads),
        }))
    }
}

struct MemorySession {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    counters: Arc<Counters>,
    deny_reads: Arc<Mutex<Vec<String>>>,
}

impl MemorySession {
    /// Key prefix of a directory's children. `.` and the empty string are
    /// the home directory, which holds the relative keys.
    fn dir_prefix(dir: &str) -> String {
        match dir.trim_end_matches('/') {
            "" if dir.starts_with('/') => "/".to_string(),
            "" | "." => String::new(),
            trimmed => format!("{trimmed}/"),
        }
    }
}

impl RemoteSession for MemorySession {
    fn list_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, FetchError> {
        let prefix = Self::dir_prefix(dir);
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());

        let mut entries: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        for (path, contents) in files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some(("", _)) => {}
                Some((sub, _)) => {
                    entries.entry(sub.to_string()).or_insert(RemoteEntry {
                        name: sub.to_string(),
                        size: 0,
                        is_dir: true,
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        RemoteEntry {
                            name: rest.to_string(),
                            size: contents.len() as u64,
                            is_dir: false,
                        },
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(FetchError::NotFound {
                path: dir.to_string(),
            });
        }
        Ok(entries.into_values().collect())
    }

    fn stat(&self, path: &str) -> Result<RemoteEntry, FetchError> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let contents = files.get(path).ok_or_else(|| FetchError::NotFound {
            path: path.to_string(),
        })?;
        Ok(RemoteEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            size: contents.len() as u64,
            is_dir: false,
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let denied = self
            .deny_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| p == path);
        if denied {
            return Err(FetchError::Authentication(format!("permission denied: {path}")));
        }
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let contents = files.get(path).cloned().ok_or_else(|| FetchError::NotFound {
            path: path.to_string(),
        })?;
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(contents)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}
