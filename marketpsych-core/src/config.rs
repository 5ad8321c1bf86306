//! Client configuration loaded from TOML.
//!
//! ```toml
//! [connection]
//! host = "sftp.news.refinitiv.com"
//! port = 22
//! user = "1234567"
//! key = "~/.ssh/1234567"
//! timeout_secs = 30
//!
//! [defaults]
//! prefix = "/mrn-mi-w/PRO/MI4"
//! template = "{prefix}/{asset_class}/{frequency}/{bucket}"
//! trial = false
//! strict = false
//! ```

use crate::data::sftp::{SftpConnector, DEFAULT_HOST, DEFAULT_PORT};
use crate::error::ConfigError;
use crate::request::MissingFilePolicy;
use crate::template::{Template, DEFAULT_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    /// Private key file; `~/.ssh/<user>` when unset.
    pub key: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: None,
            key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub prefix: String,
    /// Remote layout; an empty string detects it from the server.
    pub template: Option<String>,
    pub trial: bool,
    /// Treat missing remote files as errors.
    pub strict: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            template: None,
            trial: false,
            strict: false,
        }
    }
}

impl RequestDefaults {
    pub fn missing_policy(&self) -> MissingFilePolicy {
        if self.strict {
            MissingFilePolicy::Fail
        } else {
            MissingFilePolicy::Skip
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub defaults: RequestDefaults,
}

impl ClientConfig {
    /// `$XDG_CONFIG_HOME/marketpsych/config.toml` or the platform
    /// equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("marketpsych").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::File(format!("parse config TOML: {e}")))?;
        match config.defaults.template.as_deref().map(str::trim) {
            // An empty template asks for layout detection.
            None | Some("") => {}
            Some(raw) => {
                Template::parse(raw)?;
            }
        }
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => match Self::default_path() {
                Some(p) if p.is_file() => Self::from_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::File(format!("serialize config: {e}")))
    }

    /// Key file for `user`: the configured one, else `~/.ssh/<user>`.
    /// A leading `~/` is expanded.
    pub fn key_path(&self, user: &str) -> PathBuf {
        match &self.connection.key {
            Some(key) => expand_home(key),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join(user),
        }
    }

    /// Build an SFTP connector for `user` from this configuration.
    pub fn connector(&self, user: &str) -> SftpConnector {
        SftpConnector::new(user, self.key_path(user))
            .host(self.connection.host.clone())
            .port(self.connection.port)
            .timeout(Duration::from_secs(self.connection.timeout_secs))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
