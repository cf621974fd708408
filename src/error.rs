//! Error types for the grobid-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`GrobidError`]: **Fatal**: the batch cannot run at all (service
//!   unreachable, input path missing, bad configuration). Returned as
//!   `Err(GrobidError)` from [`crate::client::GrobidClient`] methods.
//!
//! * [`ItemError`]: **Non-fatal**: a single input file failed (service
//!   rejected it, connection dropped, output could not be written) while
//!   every other file in the batch carries on. Stored inside
//!   [`crate::output::ItemResult`] so callers see partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the grobid-batch library.
///
/// Per-file failures use [`ItemError`] and are stored in
/// [`crate::output::ItemResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum GrobidError {
    // ── Service errors ────────────────────────────────────────────────────
    /// The liveness probe could not reach the service at all.
    #[error("GROBID service at '{url}' is unreachable: {reason}\nCheck that the server is running and --server/--port are correct.")]
    ServiceUnreachable { url: String, reason: String },

    /// The service name is not one the server exposes.
    #[error("Unknown service '{name}'. Expected one of: processFulltextDocument, processHeaderDocument, processReferences")]
    UnknownService { name: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input file or directory does not exist.
    #[error("Input path not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// The output root could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The JSON config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON config file is malformed.
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Batch outcome ─────────────────────────────────────────────────────
    /// Some files succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the
    /// caller wants to treat any per-file failure as an error.
    #[error("{failed}/{total} files failed during processing")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// The batch continues regardless; no TEI file is written for the item.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The service answered with a non-success, non-overload status.
    #[error("{path}: service rejected the document with HTTP {status}")]
    Rejected { path: PathBuf, status: u16 },

    /// The service stayed overloaded past the configured retry ceiling.
    #[error("{path}: service still overloaded after {retries} retries")]
    RetriesExhausted { path: PathBuf, retries: u32 },

    /// Connection refused, DNS failure, broken pipe and the like.
    #[error("{path}: transport error: {detail}")]
    Transport { path: PathBuf, detail: String },

    /// The request exceeded the configured timeout.
    #[error("{path}: request timed out after {secs}s")]
    Timeout { path: PathBuf, secs: u64 },

    /// The input PDF could not be read from disk.
    #[error("{path}: failed to read input: {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// The TEI output could not be written.
    #[error("{path}: failed to write output: {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

impl GrobidError {
    /// `true` for errors that end the run without any work to do and are
    /// reported rather than treated as a failed run.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, GrobidError::InputNotFound { .. })
    }
}

impl ItemError {
    /// HTTP status associated with the failure, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ItemError::Rejected { status, .. } => Some(*status),
            ItemError::RetriesExhausted { .. } => Some(503),
            _ => None,
        }
    }
}
