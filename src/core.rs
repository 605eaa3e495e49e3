//! Provides types that represent the user's instructions, i.e. Efs2files and their target hosts.

pub mod host;
pub mod parser;
pub mod task;

#[doc(inline)]
pub use parser::{parse, parse_source, ParseError, Rejection, Source};

#[doc(inline)]
pub use task::{Action, File, Task};
