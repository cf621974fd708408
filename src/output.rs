//! Result types produced by a batch run.

use crate::error::{GrobidError, ItemError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One answer from the service for one file, after overload retries.
///
/// `body` is `Some` only for a 200 response; any other status is a logical
/// failure and carries no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub status: u16,
    pub body: Option<String>,
    /// Number of 503 responses that were slept on and retried.
    pub retries: u32,
    pub duration_ms: u64,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        self.body.is_some()
    }
}

/// Final record for one submitted file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub input: PathBuf,
    pub output: PathBuf,
    /// HTTP status of the final response; `None` if no response was received.
    pub status: Option<u16>,
    pub retries: u32,
    pub duration_ms: u64,
    /// Bytes of TEI written; 0 on failure.
    pub bytes_written: usize,
    pub error: Option<ItemError>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Input files considered, including skipped ones.
    pub total_files: usize,
    /// Files whose TEI output was written.
    pub processed: usize,
    pub failed: usize,
    /// Files whose output already existed (only when `force` is off).
    pub skipped: usize,
    /// Sum of 503 retries over all files.
    pub total_retries: u64,
    pub total_duration_ms: u64,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per submitted file, in completion order.
    pub items: Vec<ItemResult>,
    /// Inputs that were not submitted because their output already existed.
    pub skipped: Vec<PathBuf>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|i| !i.is_success())
    }

    /// Treat any per-file failure as an error.
    pub fn into_result(self) -> Result<Self, GrobidError> {
        if self.stats.failed > 0 {
            return Err(GrobidError::PartialFailure {
                succeeded: self.stats.processed,
                failed: self.stats.failed,
                total: self.items.len(),
            });
        }
        Ok(self)
    }
}
