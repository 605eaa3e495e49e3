//! Types for representing parsed task-file instructions.

#[cfg(doc)]
use crate::core::parser;
use serde::{Serialize, Serializer};

/// One instruction from a task file.
///
/// [Task]s are produced by [parser::parse] and are read-only afterward. The same list of [Task]s
/// is shared by every host in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Task {
    /// The trimmed instruction text, exactly as it appeared in the task file.
    raw: String,

    /// What the instruction does.
    #[serde(flatten)]
    action: Action,
}

/// The work a [Task] performs on a host.
///
/// Every [Task] has either a command, a file, or both; there is no empty variant. The combined
/// shape only comes from the legacy `RUN SCRIPT` instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Run a command on the host.
    Command(String),

    /// Upload a file to the host.
    Upload(File),

    /// Upload a script, then run it and remove it.
    ///
    /// `command` is already of the form `<destination>; rm <destination>`.
    Script { file: File, command: String },
}

/// A file transfer from the control node to a host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct File {
    /// Local path of the file to upload.
    pub source: String,

    /// Remote path to upload to.
    pub destination: String,

    /// Permission bits to apply to [Self::destination] after the upload.
    #[serde(serialize_with = "octal")]
    pub mode: u32,
}

impl Task {
    /// Creates a [Task] from its instruction text and [Action].
    pub fn new(raw: impl Into<String>, action: Action) -> Self {
        Task {
            raw: raw.into(),
            action,
        }
    }

    /// The instruction text this [Task] was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The command to run, if any.
    pub fn command(&self) -> Option<&str> {
        match &self.action {
            Action::Command(command) | Action::Script { command, .. } => Some(command),
            Action::Upload(_) => None,
        }
    }

    /// The file to upload, if any.
    pub fn file(&self) -> Option<&File> {
        match &self.action {
            Action::Upload(file) | Action::Script { file, .. } => Some(file),
            Action::Command(_) => None,
        }
    }
}

impl File {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, mode: u32) -> Self {
        File {
            source: source.into(),
            destination: destination.into(),
            mode,
        }
    }
}

/// Renders permission bits the way they're written in a task file, e.g. `0755`.
fn octal<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{mode:04o}"))
}
