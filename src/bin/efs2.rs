//! Runs an Efs2file on remote hosts over SSH.

use anyhow::anyhow;
use clap::Parser;
use efs2::config::{self, Config};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const PASSPHRASE_VAR: &str = "EFS2_PASSPHRASE";

#[derive(Debug, Parser)]
#[command(name = "efs2", version)]
#[command(about = "Run an Efs2file of commands and uploads on remote hosts over SSH")]
#[command(after_help = "Set EFS2_PASSPHRASE to unlock an encrypted private key.")]
struct Cli {
    /// Show debug logging and the resolved configuration
    #[arg(short, long)]
    verbose: bool,

    /// Suppress per-host progress output
    #[arg(short, long)]
    quiet: bool,

    /// Efs2file to read, or - for standard input
    #[arg(short = 'f', long = "file", default_value = config::DEFAULT_TASK_FILE)]
    task_file: PathBuf,

    /// Private key for authentication [default: ~/.ssh/id_rsa]
    #[arg(short = 'i', long = "key")]
    key_file: Option<PathBuf>,

    /// Run on all hosts at once
    #[arg(short, long)]
    parallel: bool,

    /// Print the tasks that would run without running them
    #[arg(short, long = "dryrun")]
    dry_run: bool,

    /// Port used for hosts that don't name one
    #[arg(long, default_value = efs2::core::host::DEFAULT_PORT)]
    port: String,

    /// Remote user [default: the current user]
    #[arg(short, long)]
    user: Option<String>,

    /// Hosts to run the Efs2file on
    #[arg(required = true)]
    hosts: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Config {
        let defaults = Config::new();
        Config {
            task_file: self.task_file,
            key_file: self.key_file.unwrap_or(defaults.key_file),
            passphrase: None,
            password: None,
            user: self.user.unwrap_or(defaults.user),
            port: self.port,
            hosts: self.hosts,
            parallel: self.parallel,
            dry_run: self.dry_run,
            verbose: self.verbose,
            quiet: self.quiet,
        }
    }
}

/// Supplies the passphrase for an encrypted key. Only called once it's known to be needed.
fn passphrase_prompt() -> anyhow::Result<String> {
    env::var(PASSPHRASE_VAR).map_err(|_| anyhow!("key is encrypted; set {PASSPHRASE_VAR}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Cli::parse().into_config();

    let default_level = match config.verbose {
        true => "debug",
        false => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(?config, "starting");

    match efs2::run(&config, passphrase_prompt).await {
        Ok(()) => {
            println!("Execution completed successfully");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error executing: {error}");
            ExitCode::FAILURE
        }
    }
}
