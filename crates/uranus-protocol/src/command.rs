//! Raw command encoding used as the audit key
//!
//! hackernel reports an executed process as `workdir`, `binary` and the
//! argument tokens joined with the ASCII unit separator.

use serde::{Deserialize, Serialize};

pub const UNIT_SEPARATOR: char = '\u{1f}';

/// Display fields derived from a raw command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParts {
    pub workdir: String,
    pub binary: String,
    /// Argument tokens joined with a single space.
    pub argv: String,
}

pub fn join_command<S: AsRef<str>>(workdir: &str, binary: &str, args: &[S]) -> String {
    let mut cmd = String::with_capacity(workdir.len() + binary.len() + 1);
    cmd.push_str(workdir);
    cmd.push(UNIT_SEPARATOR);
    cmd.push_str(binary);
    for arg in args {
        cmd.push(UNIT_SEPARATOR);
        cmd.push_str(arg.as_ref());
    }
    cmd
}

/// Splits a raw command into its display fields.
///
/// Missing tokens become empty strings: a truncated report is still
/// recorded under its exact raw key.
pub fn split_command(cmd: &str) -> CommandParts {
    let mut tokens = cmd.split(UNIT_SEPARATOR);
    let workdir = tokens.next().unwrap_or_default().to_string();
    let binary = tokens.next().unwrap_or_default().to_string();
    let argv = tokens.collect::<Vec<_>>().join(" ");
    CommandParts {
        workdir,
        binary,
        argv,
    }
}
