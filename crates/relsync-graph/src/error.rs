//! Error types for the relationship store client.

use std::io;
use thiserror::Error;

/// Relationship store errors. Mutation failures are fatal to a run and
/// carry the child process's exit code for propagation.
#[derive(Error, Debug)]
pub enum Error {
    /// The relationship CLI could not be spawned at all.
    #[error("failed to invoke {bin:?}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },

    /// The relationship CLI exited with a failure status.
    #[error("relationship {verb} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        verb: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

impl Error {
    /// Exit code of the failed store command, when the child reported one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { code, .. } => *code,
            Error::Spawn { .. } => None,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
