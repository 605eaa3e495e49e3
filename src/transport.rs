//! The interface between the orchestrator and remote hosts.
//!
//! [run_plan] only knows about [Transport] and [Session]. The production implementation lives in
//! [openssh](self::openssh); tests substitute fakes that record calls.
//!
//! [run_plan]: crate::run_plan::run_plan

use crate::core::File;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

#[cfg(feature = "openssh")]
pub mod openssh;

/// Opens sessions to hosts.
#[async_trait]
pub trait Transport<S: Session> {
    /// Connect to `config.host` and, on success, return a session on that host.
    async fn dial(&mut self, config: &ConnectionConfig) -> anyhow::Result<S>;
}

/// An open session on a single host.
#[async_trait]
pub trait Session {
    /// Runs a command on the host and returns its output.
    ///
    /// A command that runs but exits unsuccessfully is an error.
    async fn run(&mut self, command: &str) -> anyhow::Result<String>;

    /// Uploads a file to the host and applies its permission bits.
    async fn put(&mut self, file: &File) -> anyhow::Result<()>;
}

/// Everything a [Transport] needs to connect to one host.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// The remote user to log in as.
    pub user: String,

    /// The normalized `host:port` address.
    ///
    /// See [crate::core::host::normalize].
    pub host: String,

    pub auth: Auth,
}

/// How to authenticate with a host. Exactly one method is used per run.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

// Keep secrets out of logs and panic messages.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
            Auth::Key { path, passphrase } => f
                .debug_struct("Key")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("auth", &self.auth)
            .finish()
    }
}

impl ConnectionConfig {
    /// Returns a copy of `self` aimed at a different host.
    pub fn for_host(&self, host: impl Into<String>) -> Self {
        ConnectionConfig {
            host: host.into(),
            ..self.clone()
        }
    }
}
