//! Reports the progress of each [Task] on each host.
//!
//! The arrangement of this module mirrors the need to share stdout and stderr among concurrent
//! hosts. Each [Report] method on the production [Reporter] locks stdout and stderr, then calls a
//! plain function (`_starting`, `_completed`, and so on) that holds all of the formatting logic and
//! writes to whatever writers it's given. Tests call those functions with `Vec<u8>` writers. The
//! locks are released as soon as one report is written, so the output of multiple hosts is never
//! interleaved mid-report.

use crate::core::{Action, Task};
use async_trait::async_trait;
use std::fmt::Display;
use std::io::{self, Write};
use tokio::task;

/// Prints feedback about each [Task] run on a host to stdout/stderr to keep the user informed.
#[async_trait]
pub trait Report {
    /// Reports that a host could not be reached. None of its tasks will run.
    async fn connect_failed(&mut self, host: &str, error: &anyhow::Error) -> io::Result<()>;

    /// Reports that a task is about to run.
    async fn starting(&mut self, host: &str, index: usize, task: &Task) -> io::Result<()>;

    /// Reports that a task would run, during a dry run.
    async fn planned(&mut self, host: &str, index: usize, task: &Task) -> io::Result<()>;

    /// Reports that a task succeeded, along with any output it captured.
    async fn completed(
        &mut self,
        host: &str,
        index: usize,
        task: &Task,
        output: &str,
    ) -> io::Result<()>;

    /// Reports that a task failed. The host's remaining tasks will not run.
    async fn failed(
        &mut self,
        host: &str,
        index: usize,
        task: &Task,
        error: &anyhow::Error,
    ) -> io::Result<()>;
}

/// The real, production-ready [Report] implementation. Uses the real stdout/stderr.
///
/// Requires a multi-threaded Tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    /// Suppresses all per-host output.
    quiet: bool,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Reporter { quiet }
    }
}

#[async_trait]
impl Report for Reporter {
    async fn connect_failed(&mut self, host: &str, error: &anyhow::Error) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stderr = io::stderr().lock();
        task::block_in_place(move || _connect_failed(&mut stderr, host, error))
    }

    async fn starting(&mut self, host: &str, index: usize, task: &Task) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        task::block_in_place(move || _starting(&mut stdout, host, index, task))
    }

    async fn planned(&mut self, host: &str, index: usize, task: &Task) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        task::block_in_place(move || _planned(&mut stdout, host, index, task))
    }

    async fn completed(
        &mut self,
        host: &str,
        index: usize,
        task: &Task,
        output: &str,
    ) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        task::block_in_place(move || _completed(&mut stdout, host, index, task, output))
    }

    async fn failed(
        &mut self,
        host: &str,
        index: usize,
        task: &Task,
        error: &anyhow::Error,
    ) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        // Lock stdout as well so that another host's report can't land between our lines.
        let _stdout = io::stdout().lock();
        let mut stderr = io::stderr().lock();
        task::block_in_place(move || _failed(&mut stderr, host, index, task, error))
    }
}

/// Generates a one-line identifier for a [Task], suitable for use as its title in user output.
pub fn title(task: &Task) -> String {
    match task.action() {
        Action::Command(command) => format!("command: {command}"),
        Action::Upload(file) => format!(
            "upload ({:04o}): {} -> {}",
            file.mode, file.source, file.destination,
        ),
        Action::Script { file, .. } => format!("script: {}", file.source),
    }
}

/// Writes a single line prefixed with the host name.
pub fn print_host_message(
    mut writer: impl Write,
    host: &str,
    message: impl Display,
) -> io::Result<()> {
    writeln!(writer, "[{host}] {message}")
}

fn write_indented(
    mut writer: impl Write,
    header: impl Display,
    content: impl AsRef<str>,
) -> io::Result<()> {
    //                1234
    writeln!(writer, "    {header}")?;
    for line in content.as_ref().lines() {
        //                12345678
        writeln!(writer, "        {line}")?;
    }
    Ok(())
}

/// A testable function containing the logic for reporting an unreachable host.
pub fn _connect_failed(
    mut stderr: impl Write,
    host: &str,
    error: &anyhow::Error,
) -> io::Result<()> {
    print_host_message(&mut stderr, host, "Error connecting to host")?;
    write_indented(&mut stderr, "Error:", format!("{error:#}"))
}

/// A testable function containing the logic for reporting that a [Task] is starting.
pub fn _starting(stdout: impl Write, host: &str, index: usize, task: &Task) -> io::Result<()> {
    // Adding one extra space lines up "Starting" with "Completed" in the final output.
    print_host_message(stdout, host, format!("Starting  task {index} - {}", title(task)))
}

/// A testable function containing the logic for reporting a [Task] skipped by a dry run.
pub fn _planned(stdout: impl Write, host: &str, index: usize, task: &Task) -> io::Result<()> {
    print_host_message(stdout, host, format!("Would run task {index} - {}", task.raw()))
}

/// A testable function containing the logic for reporting a successful [Task].
pub fn _completed(
    mut stdout: impl Write,
    host: &str,
    index: usize,
    task: &Task,
    output: &str,
) -> io::Result<()> {
    print_host_message(
        &mut stdout,
        host,
        format!("Completed task {index} - {}", title(task)),
    )?;
    if !output.trim().is_empty() {
        write_indented(&mut stdout, "Captured output:", output)?;
    }
    Ok(())
}

/// A testable function containing the logic for reporting a failed [Task].
pub fn _failed(
    mut stderr: impl Write,
    host: &str,
    index: usize,
    task: &Task,
    error: &anyhow::Error,
) -> io::Result<()> {
    print_host_message(
        &mut stderr,
        host,
        format!("Task {index} failed. See below for details."),
    )?;
    write_indented(&mut stderr, "Error:", format!("{error:#}"))?;
    let yaml = serde_yaml::to_string(task).map_err(io::Error::other)?;
    write_indented(&mut stderr, "Task:", yaml)
}
