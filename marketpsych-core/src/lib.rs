//! MarketPsych Core: retrieval of RMA sentiment files over SFTP.
//!
//! This crate contains everything except the command line:
//! - Domain types (asset classes, frequencies, bucket folders, sources, periods)
//! - Remote path templates and request validation
//! - Transport seam with an SFTP implementation and an in-memory one
//! - TSV parsing into tables, with polars and Parquet export
//! - The download orchestrator and its report
//! - Client configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod request;
pub mod template;

pub use config::ClientConfig;
pub use data::{download, Fetcher, FetchError};
pub use domain::{AssetClass, Bucket, Frequency, Period, Source};
pub use error::ConfigError;
pub use request::{DownloadRequest, MissingFilePolicy, OutputMode, RequestParams};
pub use template::Template;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: request and result types can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<DownloadRequest>();
        require_sync::<DownloadRequest>();
        require_send::<RequestParams>();
        require_sync::<RequestParams>();
        require_send::<ClientConfig>();
        require_sync::<ClientConfig>();
        require_send::<Template>();
        require_sync::<Template>();

        require_send::<data::RmaTable>();
        require_sync::<data::RmaTable>();
        require_send::<data::DownloadOutcome>();
        require_sync::<data::DownloadOutcome>();
        require_send::<FetchError>();
        require_sync::<FetchError>();

        require_send::<data::MemoryConnector>();
        require_sync::<data::MemoryConnector>();
        require_send::<data::SftpConnector>();
        require_sync::<data::SftpConnector>();
    }

    /// The orchestrator only sees the transport through `Connector`.
    #[test]
    fn fetcher_accepts_any_connector() {
        fn _check(connector: &dyn data::Connector) -> Fetcher<'_> {
            Fetcher::new(connector)
        }
        let conn = data::MemoryConnector::new();
        let period = Period::parse("2023-01-01", None).unwrap();
        let request = DownloadRequest::new(AssetClass::Cur, Frequency::WdaiUdai, period);
        let plan = _check(&conn).plan(&request).unwrap();
        assert_eq!(plan.paths().len(), Bucket::ALL.len());
        assert_eq!(conn.connections_opened(), 0);
    }
}
