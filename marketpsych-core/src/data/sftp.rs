//! SFTP transport backed by libssh2.
//!
//! Authenticates with a user ID and an unencrypted private key, either
//! OpenSSH or PuTTY `.ppk`.
//! Every socket operation runs under a timeout so a stalled server
//! surfaces as a network error instead of hanging the call.

use super::keys::{self, PrivateKey};
use super::provider::{Connector, FetchError, RemoteEntry, RemoteSession};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "sftp.news.refinitiv.com";
pub const DEFAULT_PORT: u16 = 22;

// libssh2 status codes this transport distinguishes.
const LIBSSH2_ERROR_FILE: i32 = -16;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;

/// Connection settings for the SFTP endpoint.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    host: String,
    port: u16,
    user: String,
    key: PathBuf,
    timeout: Duration,
}

impl SftpConnector {
    pub fn new(user: impl Into<String>, key: impl Into<PathBuf>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: user.into(),
            key: key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn key_path(&self) -> &Path {
        &self.key
    }

    fn open_tcp(&self) -> Result<TcpStream, FetchError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| FetchError::Network(format!("resolve {}: {e}", self.host)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(Some(self.timeout))
                        .and_then(|_| tcp.set_write_timeout(Some(self.timeout)))
                        .map_err(|e| FetchError::Network(format!("socket setup: {e}")))?;
                    return Ok(tcp);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(FetchError::Network(match last_error {
            Some(e) => format!("connect {}:{}: {e}", self.host, self.port),
            None => format!("no address for {}", self.host),
        }))
    }
}

impl Connector for SftpConnector {
    fn name(&self) -> &str {
        "sftp"
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, FetchError> {
        if !self.key.is_file() {
            return Err(FetchError::Authentication(format!(
                "private key not found: {}",
                self.key.display()
            )));
        }

        let key = keys::load(&self.key)?;
        let tcp = self.open_tcp()?;
        let mut session =
            Session::new().map_err(|e| FetchError::Network(format!("ssh session: {e}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| FetchError::Network(format!("ssh handshake: {e}")))?;

        tracing::debug!("authenticating as {} with {}", self.user, self.key.display());
        let auth = match &key {
            PrivateKey::File(path) => session.userauth_pubkey_file(&self.user, None, path, None),
            PrivateKey::Memory(pem) => session.userauth_pubkey_memory(&self.user, None, pem, None),
        };
        auth.map_err(|e| match e.code() {
            ErrorCode::Session(
                LIBSSH2_ERROR_AUTHENTICATION_FAILED
                | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED
                | LIBSSH2_ERROR_FILE,
            ) => FetchError::Authentication(format!("{} rejected: {e}", self.user)),
            _ => FetchError::Network(format!("ssh auth: {e}")),
        })?;
        if !session.authenticated() {
            return Err(FetchError::Authentication(format!("{} not authenticated", self.user)));
        }

        let sftp = session
            .sftp()
            .map_err(|e| FetchError::Network(format!("sftp subsystem: {e}")))?;
        tracing::info!("connected to {}:{} as {}", self.host, self.port, self.user);

        Ok(Box::new(SftpSession { sftp, session }))
    }
}

struct SftpSession {
    sftp: Sftp,
    session: Session,
}

fn map_sftp_error(path: &str, e: ssh2::Error) -> FetchError {
    match e.code() {
        ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) => FetchError::NotFound {
            path: path.to_string(),
        },
        ErrorCode::SFTP(LIBSSH2_FX_PERMISSION_DENIED) => {
            FetchError::Authentication(format!("permission denied: {path}"))
        }
        _ => FetchError::Network(format!("{path}: {e}")),
    }
}

fn entry_from_stat(name: String, stat: &FileStat) -> RemoteEntry {
    RemoteEntry {
        name,
        size: stat.size.unwrap_or(0),
        is_dir: stat.is_dir(),
    }
}

impl RemoteSession for SftpSession {
    fn list_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, FetchError> {
        let listing = self
            .sftp
            .readdir(Path::new(dir))
            .map_err(|e| map_sftp_error(dir, e))?;
        Ok(listing
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(entry_from_stat(name, &stat))
            })
            .collect())
    }

    fn stat(&self, path: &str) -> Result<RemoteEntry, FetchError> {
        let stat = self
            .sftp
            .stat(Path::new(path))
            .map_err(|e| map_sftp_error(path, e))?;
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(entry_from_stat(name, &stat))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let mut file = self
            .sftp
            .open(Path::new(path))
            .map_err(|e| map_sftp_error(path, e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| FetchError::Network(format!("{path}: {e}")))?;
        Ok(buf)
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            tracing::debug!("ssh disconnect: {e}");
        }
    }
}
