//! Production [Transport] based on the [openssh] crate.
//!
//! Sessions are multiplexed over the system `ssh` client, so `~/.ssh/config`, known hosts, and
//! `ssh-agent` all apply as usual. Uploads shell out to the system `scp`.
//!
//! The system client runs in batch mode and cannot be handed a passphrase, so an encrypted key is
//! decrypted once by [ConnectionManager::for_auth] into a private temporary file that the client
//! reads instead. Password authentication is not available over this transport.

use super::{Auth, ConnectionConfig, Session, Transport};
use crate::core::host;
use crate::core::File;
use crate::credentials;
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use openssh::{KnownHosts, SessionBuilder};
use ssh_key::LineEnding;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

/// Production implementation of [Transport].
#[derive(Clone, Debug, Default)]
pub struct ConnectionManager {
    /// Decrypted copy of an encrypted key. Removed when the last clone is dropped.
    unlocked: Option<Arc<NamedTempFile>>,
}

impl ConnectionManager {
    /// Prepares a [ConnectionManager] for the run's credentials.
    ///
    /// Fails for [Auth::Password], and for a key that cannot be decrypted with its passphrase.
    pub fn for_auth(auth: &Auth) -> anyhow::Result<Self> {
        match auth {
            Auth::Password(_) => bail!(
                "password authentication is not supported over OpenSSH multiplexing; \
                use a private key or ssh-agent"
            ),
            Auth::Key {
                passphrase: None, ..
            } => Ok(ConnectionManager::default()),
            Auth::Key {
                path,
                passphrase: Some(passphrase),
            } => Ok(ConnectionManager {
                unlocked: Some(Arc::new(unlock_to_file(path, passphrase)?)),
            }),
        }
    }

    /// The key file the system `ssh` client should read.
    fn keyfile<'a>(&'a self, auth: &'a Auth) -> anyhow::Result<&'a Path> {
        match (auth, &self.unlocked) {
            (Auth::Password(_), _) => bail!(
                "password authentication is not supported over OpenSSH multiplexing; \
                use a private key or ssh-agent"
            ),
            (Auth::Key { .. }, Some(unlocked)) => Ok(unlocked.path()),
            (Auth::Key { path, passphrase }, None) => {
                if passphrase.is_some() {
                    bail!("encrypted key {} was not unlocked", path.display());
                }
                Ok(path)
            }
        }
    }
}

/// Decrypts the key at `path` and writes it, unencrypted, to a file only this user can read.
fn unlock_to_file(path: &Path, passphrase: &str) -> anyhow::Result<NamedTempFile> {
    let key = credentials::unlock(path, passphrase)?;
    let encoded = key
        .to_openssh(LineEnding::LF)
        .with_context(|| format!("unable to re-encode private key {}", path.display()))?;

    let mut file = tempfile::Builder::new()
        .prefix("efs2-key-")
        .tempfile()
        .context("unable to create temporary key file")?;
    file.write_all(encoded.as_bytes())
        .context("unable to write temporary key file")?;
    debug!(key = %path.display(), "unlocked encrypted key");
    Ok(file)
}

#[async_trait]
impl Transport<Client> for ConnectionManager {
    async fn dial(&mut self, config: &ConnectionConfig) -> anyhow::Result<Client> {
        let (hostname, port) = host::split(&config.host)
            .ok_or_else(|| anyhow!("host {} has no port; normalize it first", config.host))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port in {}", config.host))?;
        let keyfile = self.keyfile(&config.auth)?.to_owned();

        let mut builder = SessionBuilder::default();
        builder
            .user(config.user.clone())
            .port(port)
            .keyfile(&keyfile)
            .known_hosts_check(KnownHosts::Add);

        debug!(host = %config.host, user = %config.user, "connecting");
        let session = builder.connect_mux(hostname).await?;

        Ok(Client {
            session,
            user: config.user.clone(),
            hostname: hostname.to_owned(),
            port,
            keyfile,
        })
    }
}

/// Production implementation of [Session].
pub struct Client {
    session: openssh::Session,
    user: String,
    hostname: String,
    port: u16,
    keyfile: PathBuf,
}

#[async_trait]
impl Session for Client {
    async fn run(&mut self, command: &str) -> anyhow::Result<String> {
        let output = self.session.raw_command(command).output().await?;
        check(command, output)
    }

    async fn put(&mut self, file: &File) -> anyhow::Result<()> {
        let args = scp_args(&self.user, &self.hostname, self.port, &self.keyfile, file);
        let output = Command::new("scp")
            .args(&args)
            .output()
            .await
            .context("failed to start scp")?;
        check(&format!("scp {}", file.source), output)?;

        self.run(&chmod_command(file)?).await?;
        Ok(())
    }
}

/// Builds the argument list for uploading `file` with the system `scp`.
fn scp_args(
    user: &str,
    hostname: &str,
    port: u16,
    keyfile: &Path,
    file: &File,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-q".into(),
        "-o".into(),
        "BatchMode=yes".into(),
        "-P".into(),
        port.to_string().into(),
        "-i".into(),
        keyfile.into(),
    ];
    args.push(file.source.clone().into());
    args.push(format!("{user}@{hostname}:{}", file.destination).into());
    args
}

/// Builds the remote command that applies `file`'s permission bits.
fn chmod_command(file: &File) -> anyhow::Result<String> {
    let destination = shlex::try_quote(&file.destination)
        .with_context(|| format!("cannot quote destination path: {:?}", file.destination))?;
    Ok(format!("chmod {:o} {destination}", file.mode))
}

/// Turns a finished process into its stdout, or an error describing how it failed.
fn check(command: &str, output: Output) -> anyhow::Result<String> {
    if !output.status.success() {
        let exit_code_message = match output.status.code() {
            Some(i) => format!("exit code {i}"),
            None => "error".to_string(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("command exited with {exit_code_message}: {command}\n{}", stderr.trim_end());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
