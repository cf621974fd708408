//! # grobid-batch
//!
//! Batch-convert PDF collections to TEI-XML through a GROBID-style
//! document-processing service.
//!
//! The service does the parsing; this crate does the orchestration: find the
//! PDFs, send them with bounded concurrency, wait out `503 Service
//! Unavailable` answers, and write each TEI document to a predictable path.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input path
//!  │
//!  ├─ 1. Discover  walk the directory, collect *.pdf (or take the one file)
//!  ├─ 2. Plan      resolve each output path, skip existing ones unless --force
//!  ├─ 3. Dispatch  ≤ N concurrent POST /api/{service}, sleep-and-retry on 503
//!  └─ 4. Write     create parent dirs, write <name>.tei.xml
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grobid_batch::{BatchOptions, ClientConfig, GrobidClient, RequestOptions, Service};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load_or_default("config.json")?;
//!     let client = GrobidClient::new(config)?;
//!     client.check_alive().await?;
//!
//!     let options = BatchOptions {
//!         service: Service::ProcessFulltextDocument,
//!         request: RequestOptions { consolidate_header: true, ..Default::default() },
//!         force: false,
//!     };
//!     let report = client
//!         .process(Path::new("papers"), Some(Path::new("tei")), options)
//!         .await?;
//!     eprintln!("{}/{} written", report.stats.processed, report.items.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `grobid-client` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::GrobidClient;
pub use config::{BatchOptions, ClientConfig, ClientConfigBuilder, RequestOptions, Service};
pub use dispatch::{BatchDispatcher, Completion, Job};
pub use error::{GrobidError, ItemError};
pub use output::{BatchReport, BatchStats, CallOutcome, ItemResult};
pub use pipeline::remote::{GrobidTransport, HttpTransport, RemoteCaller, TransportResponse, WorkItem};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
