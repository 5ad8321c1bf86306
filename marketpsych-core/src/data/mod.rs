//! Remote access, parsing and delivery

pub mod archive;
pub mod download;
pub mod keys;
pub mod memory;
pub mod plan;
pub mod provider;
pub mod schema;
pub mod sftp;
pub mod table;

pub use download::{download, DownloadOutcome, DownloadReport, Fetcher, Output, RemoteFile};
pub use memory::MemoryConnector;
pub use plan::{detect_template, plan, plan_with, Plan, Resolved};
pub use provider::{Connector, FetchError, FetchProgress, LogProgress, NoProgress, RemoteEntry, RemoteSession};
pub use schema::{RmaSchema, SchemaError};
pub use sftp::SftpConnector;
pub use table::{RmaRecord, RmaTable, Value};
