//! Error types for the reconciliation engine.
//!
//! Only relationship store failures escape a reconciliation decision;
//! inventory lookup failures are a decision branch (record absent), not
//! an error.

use thiserror::Error;

/// Reconciliation errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A consistency read against the relationship store failed. Drift
    /// decisions against a read that did not succeed are unsafe, so this
    /// is fatal to the run.
    #[error("relationship store failure: {0}")]
    Store(#[from] relsync_graph::Error),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
