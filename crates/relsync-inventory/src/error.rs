//! Error types for the inventory lookup client.

use std::io;
use thiserror::Error;

/// Inventory lookup errors.
///
/// Callers treat every variant as "record could not be resolved";
/// nonexistence is a legitimate steady state in this system, so none of
/// these are fatal to a run.
#[derive(Error, Debug)]
pub enum Error {
    /// The query CLI could not be spawned at all.
    #[error("failed to invoke {bin:?}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },

    /// The query CLI exited with a failure status.
    #[error("inventory query exited with {status}: {stderr}")]
    QueryFailed { status: String, stderr: String },

    /// Response rows failed to decode.
    #[error("undecodable inventory response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;
