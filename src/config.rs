//! Run configuration.

use crate::core::host::DEFAULT_PORT;
use std::env;
use std::path::PathBuf;

/// The task file read when none is specified.
pub const DEFAULT_TASK_FILE: &str = "./Efs2file";

/// Everything one invocation needs: where the tasks come from, where they go, and how.
///
/// [Config::new] fills in the same defaults the command line does.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Path to the Efs2file, or `-` for standard input.
    pub task_file: PathBuf,

    /// Private key used when [Self::password] is unset.
    pub key_file: PathBuf,

    /// Passphrase for [Self::key_file], if it is encrypted.
    pub passphrase: Option<String>,

    /// Password authentication. Takes precedence over key authentication.
    pub password: Option<String>,

    /// Remote user to log in as.
    pub user: String,

    /// Port appended to hosts that don't name one.
    pub port: String,

    /// Target hosts, in the order given.
    pub hosts: Vec<String>,

    pub parallel: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// The parts of a [Config] that govern how tasks run.
///
/// Only `parallel` and `dry_run` change control flow. `quiet` and `verbose` only change output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub parallel: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Config {
    /// Creates a [Config] with default values and no hosts.
    pub fn new() -> Self {
        Config {
            task_file: PathBuf::from(DEFAULT_TASK_FILE),
            key_file: default_key_file(),
            passphrase: None,
            password: None,
            user: current_user(),
            port: DEFAULT_PORT.to_owned(),
            hosts: vec![],
            parallel: false,
            dry_run: false,
            verbose: false,
            quiet: false,
        }
    }

    pub fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            parallel: self.parallel,
            dry_run: self.dry_run,
            verbose: self.verbose,
            quiet: self.quiet,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// Hand-written so that secrets stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("task_file", &self.task_file)
            .field("key_file", &self.key_file)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("port", &self.port)
            .field("hosts", &self.hosts)
            .field("parallel", &self.parallel)
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// Returns `~/.ssh/id_rsa`, or a relative `.ssh/id_rsa` if there's no home directory.
pub fn default_key_file() -> PathBuf {
    let mut path = home::home_dir().unwrap_or_default();
    path.push(".ssh");
    path.push("id_rsa");
    path
}

/// Returns the name of the user running this process, or an empty string if it's unknown.
pub fn current_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(PathBuf::from("./Efs2file"), config.task_file);
        assert_eq!("22", config.port);
        assert!(config.key_file.ends_with(".ssh/id_rsa"));
        assert!(config.hosts.is_empty());
        assert_eq!(ExecutionPolicy::default(), config.policy());
    }

    #[test]
    fn policy_copies_flags() {
        let config = Config {
            parallel: true,
            dry_run: true,
            quiet: true,
            ..Config::new()
        };
        assert_eq!(
            ExecutionPolicy {
                parallel: true,
                dry_run: true,
                verbose: false,
                quiet: true,
            },
            config.policy(),
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = Config {
            password: Some("hunter2".into()),
            passphrase: Some("swordfish".into()),
            ..Config::new()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("swordfish"));
    }
}
