//! Pipeline stages for PDF-to-TEI batch processing.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and the dispatcher only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ path ──▶ remote ──▶ writer
//! (walk dir)  (resolve)  (HTTP + 503 retry)  (mkdir + write)
//! ```
//!
//! 1. [`discover`]: expand the user's input into a sorted list of PDFs
//! 2. [`path`]: pure mapping from input file to TEI output path
//! 3. [`remote`]: the only stage with network I/O; retries on overload
//! 4. [`writer`]: create parent directories and write the TEI body

pub mod discover;
pub mod path;
pub mod remote;
pub mod writer;
