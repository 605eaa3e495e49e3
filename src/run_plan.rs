//! Runs [Task]s on hosts and collects the outcome of each host.
//!
//! Every host gets its own Tokio task. A host's tasks always run in file order, and the first
//! failure stops that host without touching any other host. When a worker finishes, it sends its
//! [HostOutcome] down a channel to a single aggregating loop, which puts the outcomes back in the
//! order the hosts were given.

pub mod report;

use crate::config::ExecutionPolicy;
use crate::core::{Action, Task};
use crate::transport::{ConnectionConfig, Session, Transport};
use anyhow::Context;
use report::Report;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[cfg(feature = "openssh")]
use crate::{
    config::Config,
    core::{host, parse_source, Source},
    credentials,
    transport::openssh::ConnectionManager,
};

/// Why a host did not finish its tasks.
#[derive(Debug, Error)]
pub enum HostFailure {
    #[error("unable to connect: {0:#}")]
    Connect(anyhow::Error),

    #[error("task {index} failed: {error:#}")]
    Task { index: usize, error: anyhow::Error },

    /// The host's worker died before it could report back.
    #[error("worker aborted: {0:#}")]
    Aborted(anyhow::Error),
}

/// What happened on one host.
#[derive(Debug)]
pub struct HostOutcome {
    pub host: String,
    pub failure: Option<HostFailure>,
}

impl HostOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// The outcome of every host in a run, in the order the hosts were given.
#[derive(Debug, Default)]
pub struct RunResult {
    outcomes: Vec<HostOutcome>,
}

impl RunResult {
    pub fn outcomes(&self) -> &[HostOutcome] {
        &self.outcomes
    }

    /// The number of hosts that failed.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.host.as_str())
            .collect()
    }

    /// Collapses the run into a single error naming how many hosts failed.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.failures() {
            0 => Ok(()),
            n => anyhow::bail!("Execution failed with {n} errors"),
        }
    }
}

/// Parses the configured Efs2file and runs it on every configured host over SSH.
///
/// `prompt` is called at most once, and only if the private key turns out to be encrypted with no
/// passphrase configured.
#[cfg(feature = "openssh")]
pub async fn run<P>(config: &Config, prompt: P) -> anyhow::Result<()>
where
    P: FnOnce() -> anyhow::Result<String>,
{
    let source = Source::from(config.task_file.as_path());
    let tasks = parse_source(&source)?;
    debug!(tasks = tasks.len(), "parsed Efs2file");

    let auth = credentials::resolve(config, prompt)?;
    let transport = ConnectionManager::for_auth(&auth)?;
    let hosts = host::normalize_all(&config.hosts, &config.port);
    let connection = ConnectionConfig {
        user: config.user.clone(),
        host: String::new(),
        auth,
    };

    run_plan(
        tasks,
        &hosts,
        transport,
        report::Reporter::new(config.quiet),
        config.policy(),
        connection,
    )
    .await
    .into_result()
}

/// Runs `tasks` on each of `hosts`, which must already be normalized.
///
/// With `policy.parallel` set, all hosts run at once. Otherwise each host finishes before the next
/// one starts. `connection` supplies the user and credentials; its host is replaced per host.
///
/// Never fails as a whole. Per-host failures are recorded in the returned [RunResult].
pub async fn run_plan<T, S, R>(
    tasks: impl Into<Arc<[Task]>>,
    hosts: &[String],
    transport: T,
    reporter: R,
    policy: ExecutionPolicy,
    connection: ConnectionConfig,
) -> RunResult
where
    T: Transport<S> + Clone + Send + 'static,
    S: Session + Send + 'static,
    R: Report + Clone + Send + 'static,
{
    let tasks = tasks.into();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut running = Vec::new();

    for (position, host) in hosts.iter().enumerate() {
        let worker = tokio::spawn(run_host_plan(
            position,
            host.clone(),
            tasks.clone(),
            transport.clone(),
            reporter.clone(),
            policy.dry_run,
            connection.for_host(host),
            tx.clone(),
        ));

        match policy.parallel {
            true => running.push((position, host.clone(), worker)),
            false => reap(position, host.clone(), worker.await, &tx),
        }
    }

    for (position, host, worker) in running {
        reap(position, host, worker.await, &tx);
    }
    drop(tx);

    let mut slots: Vec<Option<HostOutcome>> = hosts.iter().map(|_| None).collect();
    while let Some((position, outcome)) = rx.recv().await {
        slots[position].get_or_insert(outcome);
    }

    let outcomes: Vec<HostOutcome> = slots.into_iter().flatten().collect();
    info!(
        hosts = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.is_success()).count(),
        "run finished",
    );
    RunResult { outcomes }
}

type OutcomeSender = mpsc::UnboundedSender<(usize, HostOutcome)>;

/// Records a worker that died without sending its outcome.
fn reap(
    position: usize,
    host: String,
    joined: Result<(), tokio::task::JoinError>,
    tx: &OutcomeSender,
) {
    if let Err(join_error) = joined {
        warn!(%host, "worker aborted: {join_error}");
        let failure = HostFailure::Aborted(anyhow::Error::new(join_error));
        // The receiver lives until every worker is reaped.
        let _ = tx.send((
            position,
            HostOutcome {
                host,
                failure: Some(failure),
            },
        ));
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_host_plan<T, S, R>(
    position: usize,
    host: String,
    tasks: Arc<[Task]>,
    mut transport: T,
    mut reporter: R,
    dry_run: bool,
    connection: ConnectionConfig,
    tx: OutcomeSender,
) where
    T: Transport<S> + Send,
    S: Session + Send,
    R: Report + Send,
{
    let failure = _run_host_plan(
        &host,
        &tasks,
        &mut transport,
        &mut reporter,
        dry_run,
        &connection,
    )
    .await
    .err();

    match &failure {
        None => info!(%host, "host completed"),
        // The reporter has already shown this to the user.
        Some(failure) => info!(%host, "host failed: {failure}"),
    }
    let _ = tx.send((position, HostOutcome { host, failure }));
}

/// Connects to `host` and runs `tasks` on it in order, stopping at the first failure.
async fn _run_host_plan<T, S, R>(
    host: &str,
    tasks: &[Task],
    transport: &mut T,
    reporter: &mut R,
    dry_run: bool,
    connection: &ConnectionConfig,
) -> Result<(), HostFailure>
where
    T: Transport<S> + Send,
    S: Session + Send,
    R: Report + Send,
{
    debug!(%host, user = %connection.user, "dialing");
    let mut session = match transport.dial(connection).await {
        Ok(session) => session,
        Err(error) => {
            if let Err(report_error) = reporter.connect_failed(host, &error).await {
                warn!(%host, "unable to write report: {report_error}");
            }
            return Err(HostFailure::Connect(error));
        }
    };

    for (index, task) in tasks.iter().enumerate() {
        if dry_run {
            let reported = reporter.planned(host, index, task).await;
            note_report_error(host, index, reported);
            continue;
        }

        let reported = reporter.starting(host, index, task).await;
        note_report_error(host, index, reported);

        debug!(%host, index, raw = task.raw(), "running task");
        match execute(&mut session, task).await {
            Ok(output) => {
                let reported = reporter.completed(host, index, task, &output).await;
                note_report_error(host, index, reported);
            }
            Err(error) => {
                let reported = reporter.failed(host, index, task, &error).await;
                note_report_error(host, index, reported);
                return Err(HostFailure::Task { index, error });
            }
        }
    }

    Ok(())
}

/// Performs one [Task] on an open session and returns whatever output it captured.
async fn execute<S: Session + Send>(session: &mut S, task: &Task) -> anyhow::Result<String> {
    match task.action() {
        Action::Command(command) => session.run(command).await,
        Action::Upload(file) => {
            session
                .put(file)
                .await
                .with_context(|| format!("failed to upload {}", file.source))?;
            Ok(String::new())
        }
        Action::Script { file, command } => {
            session
                .put(file)
                .await
                .with_context(|| format!("failed to upload script {}", file.source))?;
            session.run(command).await
        }
    }
}

/// Output is best effort. A closed stdout must not stop tasks that are already underway.
fn note_report_error(host: &str, index: usize, reported: std::io::Result<()>) {
    if let Err(error) = reported {
        warn!(%host, index, "unable to write report: {error}");
    }
}
