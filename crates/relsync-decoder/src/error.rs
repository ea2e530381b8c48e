//! Error types for the event decoder.
//!
//! Every variant names the reason a line was rejected; the driver reports
//! it and moves on. Decoding never panics on malformed input.

use relsync_types::UnknownOperation;
use thiserror::Error;

/// Decoder errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Line carries neither an operation marker nor an embedded payload.
    #[error("line matches neither change-log format")]
    UnrecognizedLine,

    /// Tabular record ends before the expected field.
    #[error("record ends after {found} fields, expected more")]
    TruncatedRecord { found: usize },

    /// A JSON field is missing a required key, or the key has the wrong
    /// shape for the event's operation.
    #[error("missing or invalid {0:?} key in log field")]
    MissingKey(&'static str),

    /// Operation marker names an unknown kind.
    #[error("unsupported operation marker: {0}")]
    UnknownOperation(#[from] UnknownOperation),

    /// Embedded-format line has no 36-character inventory id token.
    #[error("no inventory id token in embedded payload")]
    MissingInventoryId,

    /// Embedded payload fragment opens but never closes.
    #[error("embedded payload fragment is not terminated")]
    UnterminatedPayload,

    /// JSON decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;
