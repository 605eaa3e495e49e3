//! Reads Efs2files and turns them into [Task]s.
//!
//! # Grammar
//!
//! An Efs2file is read one line at a time. Each line is trimmed, then classified:
//!
//! | Line                         | Result                                                    |
//! |------------------------------|-----------------------------------------------------------|
//! | blank                        | skipped                                                   |
//! | `# ...`                      | comment; skipped                                          |
//! | `RUN <command>`              | [Action::Command]                                         |
//! | `RUN CMD <command>`          | [Action::Command] (legacy syntax)                         |
//! | `RUN SCRIPT <path>`          | [Action::Script] (legacy syntax)                          |
//! | `PUT <source> <dest> <mode>` | [Action::Upload]; `<mode>` is three or four octal digits |
//!
//! Anything else rejects the whole file.

use crate::core::task::{Action, File, Task};
use chrono::Utc;
use regex::Regex;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use thiserror::Error;

/// The directory that receives scripts uploaded by `RUN SCRIPT`.
pub const SCRIPT_DIR: &str = "/tmp";

/// Permission bits given to scripts uploaded by `RUN SCRIPT`.
pub const SCRIPT_MODE: u32 = 0o700;

/// The [Source] value that means "read standard input".
pub const STDIN_SENTINEL: &str = "-";

/// Where to read an Efs2file from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Stdin,
    Path(PathBuf),
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        if path == Path::new(STDIN_SENTINEL) {
            Source::Stdin
        } else {
            Source::Path(path.to_owned())
        }
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Path::new(path).into()
    }
}

/// Reasons an Efs2file can be rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read Efs2file {} - {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading Efs2file after line {line} - {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("Unable to parse Efs2file line {line}: {text}")]
    Unrecognized { line: usize, text: String },

    #[error("PUT definition on line {line} is incorrect")]
    PutFieldCount { line: usize },

    #[error("could not convert mode value to integer on line {line} - {mode}")]
    BadMode { line: usize, mode: String },
}

/// A rejected Efs2file.
///
/// Holds the [Task]s that were parsed before the offending line, for diagnostics only. A rejected
/// file must never be executed, even partially.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejection {
    pub tasks: Vec<Task>,
    pub error: ParseError,
}

impl Rejection {
    fn new(tasks: Vec<Task>, error: ParseError) -> Self {
        Rejection { tasks, error }
    }
}

/// Opens `source` and parses it with [parse].
pub fn parse_source(source: &Source) -> Result<Vec<Task>, Rejection> {
    match source {
        Source::Stdin => parse(io::stdin().lock()),
        Source::Path(path) => {
            let file = fs::File::open(path).map_err(|source| {
                Rejection::new(
                    vec![],
                    ParseError::Open {
                        path: path.clone(),
                        source,
                    },
                )
            })?;
            parse(BufReader::new(file))
        }
    }
}

/// Parses an Efs2file into an ordered list of [Task]s.
///
/// Parsing stops at the first bad line.
pub fn parse<R: BufRead>(reader: R) -> Result<Vec<Task>, Rejection> {
    let mut tasks = vec![];

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(source) => {
                let error = ParseError::Read {
                    line: index,
                    source,
                };
                return Err(Rejection::new(tasks, error));
            }
        };

        match parse_line(line.trim(), number) {
            Ok(Some(task)) => tasks.push(task),
            Ok(None) => {}
            Err(error) => return Err(Rejection::new(tasks, error)),
        }
    }

    Ok(tasks)
}

/// Classifies one trimmed line. Returns [None] for lines that produce no [Task].
fn parse_line(line: &str, number: usize) -> Result<Option<Task>, ParseError> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let words: Vec<&str> = line.split_whitespace().collect();

    if legacy_run_pattern().is_match(line) {
        let action = match words[1] {
            "CMD" => Action::Command(words[2..].join(" ")),
            _ => {
                let destination = format!("{SCRIPT_DIR}/{}", tmp_name());
                Action::Script {
                    command: format!("{destination}; rm {destination}"),
                    file: File::new(words[2], destination, SCRIPT_MODE),
                }
            }
        };
        return Ok(Some(Task::new(line, action)));
    }

    if run_pattern().is_match(line) {
        let action = Action::Command(words[1..].join(" "));
        return Ok(Some(Task::new(line, action)));
    }

    if put_pattern().is_match(line) {
        if words.len() != 4 {
            return Err(ParseError::PutFieldCount { line: number });
        }
        let mode = u32::from_str_radix(words[3], 8).map_err(|_| ParseError::BadMode {
            line: number,
            mode: words[3].to_owned(),
        })?;
        let action = Action::Upload(File::new(words[1], words[2], mode));
        return Ok(Some(Task::new(line, action)));
    }

    Err(ParseError::Unrecognized {
        line: number,
        text: line.to_owned(),
    })
}

/// Matches all RUN instructions, legacy ones included.
fn run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^RUN .*$").unwrap())
}

/// Matches the legacy `RUN CMD` and `RUN SCRIPT` instructions.
fn legacy_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^RUN (CMD|SCRIPT) .*$").unwrap())
}

/// Matches PUT instructions. Field count and mode are checked separately so that each gets its
/// own error.
fn put_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^PUT .* [0-9]{3,4}$").unwrap())
}

/// Generates a nine-digit file name for an uploaded script.
///
/// Names only need to be unique within a run. A per-process counter guarantees that; the clock and
/// process ID seed keeps concurrent runs against the same host from colliding in practice.
pub fn tmp_name() -> String {
    static SEED: OnceLock<u32> = OnceLock::new();
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seed = *SEED.get_or_init(|| {
        Utc::now()
            .timestamp_subsec_nanos()
            .wrapping_add(std::process::id())
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223)
    });
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{:09}", (u64::from(seed) + u64::from(count)) % 1_000_000_000)
}

#[cfg(test)]
mod test;
