//! Minimal remote configuration management.
//!
//! # Efs2files
//!
//! An Efs2file lists, one per line, the things to do on each host: run a command, upload a file,
//! or upload and run a script. See [core::parser] for the grammar.
//!
//! # Program flow
//!
//! 1. The user invokes the `efs2` binary with a list of hosts.
//!
//! 2. The Efs2file is parsed into an ordered list of [core::Task]s. Any bad line rejects the whole
//!    file, so nothing runs.
//!
//! 3. [credentials::resolve] settles on one way to authenticate, and each host is normalized to
//!    `host:port` by [core::host::normalize].
//!
//! 4. [run_plan::run_plan] connects to every host through a [transport::Transport] and runs the
//!    tasks in order, one host at a time or all at once. A host stops at its first failure; the
//!    other hosts carry on.
//!
//! 5. The per-host outcomes are gathered into a [run_plan::RunResult], which the binary turns
//!    into an exit status.

pub mod config;
pub mod core;
pub mod credentials;
pub mod run_plan;
pub mod transport;

#[doc(inline)]
pub use run_plan::{run_plan, HostFailure, HostOutcome, RunResult};

#[cfg(feature = "openssh")]
#[doc(inline)]
pub use run_plan::run;
