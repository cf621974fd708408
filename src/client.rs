//! Top-level entry point: probe the service, collect inputs, run a batch.

use crate::config::{BatchOptions, ClientConfig};
use crate::dispatch::BatchDispatcher;
use crate::error::GrobidError;
use crate::output::BatchReport;
use crate::pipeline::discover;
use crate::pipeline::remote::{GrobidTransport, HttpTransport, RemoteCaller, WorkItem};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Client for a GROBID-style document-processing service.
///
/// # Example
/// ```rust,no_run
/// use grobid_batch::{BatchOptions, ClientConfig, GrobidClient, Service};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GrobidClient::new(ClientConfig::default())?;
/// client.check_alive().await?;
///
/// let options = BatchOptions {
///     service: Service::ProcessFulltextDocument,
///     ..Default::default()
/// };
/// let report = client.process("papers/".as_ref(), Some("tei/".as_ref()), options).await?;
/// eprintln!("{} written, {} failed", report.stats.processed, report.stats.failed);
/// # Ok(())
/// # }
/// ```
pub struct GrobidClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    transport: Arc<dyn GrobidTransport>,
}

impl GrobidClient {
    /// Build a client talking HTTP to `config.base_url()`.
    pub fn new(config: ClientConfig) -> Result<Self, GrobidError> {
        let config = Arc::new(config);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GrobidError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let transport = Arc::new(HttpTransport::with_client(http.clone(), Arc::clone(&config)));
        Ok(Self {
            config,
            http,
            transport,
        })
    }

    /// Replace the transport used for processing calls (the liveness probe
    /// still goes over HTTP).
    pub fn with_transport(mut self, transport: Arc<dyn GrobidTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Probe `/api/isalive`.
    ///
    /// # Returns
    /// `Ok(true)` on HTTP 200 only, `Ok(false)` (with a warning) on any other status.
    ///
    /// # Errors
    /// [`GrobidError::ServiceUnreachable`] when no response arrives at all.
    pub async fn check_alive(&self) -> Result<bool, GrobidError> {
        let url = self.config.isalive_url();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GrobidError::ServiceUnreachable {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            info!("GROBID server is up and running at {}", self.config.base_url());
            Ok(true)
        } else {
            warn!("GROBID server at {} answered isalive with HTTP {}", url, status.as_u16());
            Ok(false)
        }
    }

    /// Process a single PDF or every PDF under a directory.
    ///
    /// With `output = None` each TEI file lands next to its PDF. A missing
    /// output directory is created first.
    ///
    /// # Errors
    /// Only fatal errors: input not found, output directory not creatable.
    /// Per-file failures are in the returned report.
    pub async fn process(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: BatchOptions,
    ) -> Result<BatchReport, GrobidError> {
        let root = input.to_path_buf();
        let pdfs = tokio::task::spawn_blocking(move || discover::collect_pdfs(&root))
            .await
            .map_err(|e| GrobidError::Internal(format!("Discovery task panicked: {e}")))??;

        if let Some(out) = output {
            if !out.is_dir() {
                info!("Output directory {} does not exist, creating it", out.display());
                tokio::fs::create_dir_all(out)
                    .await
                    .map_err(|e| GrobidError::OutputDirFailed {
                        path: out.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        if pdfs.is_empty() {
            warn!("No PDF files found under {}", input.display());
            return Ok(BatchReport::default());
        }
        info!(
            "{} PDF files found under {}, service {}",
            pdfs.len(),
            input.display(),
            options.service
        );

        let items = pdfs
            .into_iter()
            .map(|p| WorkItem::new(p, options))
            .collect();

        let caller = RemoteCaller::new(Arc::clone(&self.transport), Arc::clone(&self.config));
        let dispatcher = BatchDispatcher::new(caller, Arc::clone(&self.config));
        Ok(dispatcher.run(items, input, output).await)
    }
}
