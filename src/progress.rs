//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ClientConfigBuilder::progress_callback`] to receive
//! events as the dispatcher moves each file through the service.
//!
//! # Example
//!
//! ```rust
//! use grobid_batch::{BatchProgressCallback, ClientConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, input: &Path, output: &Path, bytes: usize) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} -> {} ({} bytes)", input.display(), output.display(), bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = ClientConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the dispatcher as it processes each file.
///
/// Implementations must be `Send + Sync`: up to `concurrency` files are in
/// flight at once, so `on_item_start` and `on_item_retry` may interleave
/// for different files. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any file is submitted.
    ///
    /// # Arguments
    /// * `total_files`: files that will be submitted (skipped files excluded)
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file's output already exists and `force` is off.
    fn on_item_skipped(&self, input: &Path, output: &Path) {
        let _ = (input, output);
    }

    /// Called just before the first request for a file is sent.
    fn on_item_start(&self, input: &Path) {
        let _ = input;
    }

    /// Called each time the service answers 503 and the file will be retried.
    ///
    /// # Arguments
    /// * `attempt`: 1-based number of the retry about to happen
    /// * `backoff_ms`: delay before that retry
    fn on_item_retry(&self, input: &Path, attempt: u32, backoff_ms: u64) {
        let _ = (input, attempt, backoff_ms);
    }

    /// Called once a file's TEI output has been written.
    fn on_item_complete(&self, input: &Path, output: &Path, bytes: usize) {
        let _ = (input, output, bytes);
    }

    /// Called when a file fails (rejected, transport or write error).
    fn on_item_error(&self, input: &Path, error: &str) {
        let _ = (input, error);
    }

    /// Called once after every submitted file has been attempted.
    ///
    /// # Arguments
    /// * `total_files`: files submitted
    /// * `success_count`: files whose TEI output was written
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
