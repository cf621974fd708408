//! Remote calls: send one PDF to the service and wait for its TEI.
//!
//! ## Retry Strategy
//!
//! The service answers 503 when its own parsing pool is full. That state is
//! transient by construction, so a 503 is slept on for a fixed
//! `retry_backoff_ms` and the identical request is sent again. There is no
//! attempt limit unless `max_retries` is configured: the caller waits for the
//! service rather than failing files it would accept a few seconds later.
//!
//! Every other status is final. Transport errors (refused connection, DNS,
//! timeout) are returned as [`ItemError`] without retrying.
//!
//! The HTTP exchange itself sits behind [`GrobidTransport`] so the retry loop
//! can be driven by a scripted transport in tests.

use crate::config::{BatchOptions, ClientConfig, RequestOptions};
use crate::error::{GrobidError, ItemError};
use crate::output::CallOutcome;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Status the service uses to signal "busy, come back later".
pub const OVERLOADED: u16 = 503;

/// Status of a successful parse.
pub const OK: u16 = 200;

/// One input file plus the options shared by the whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input: PathBuf,
    pub options: BatchOptions,
}

impl WorkItem {
    pub fn new(input: impl Into<PathBuf>, options: BatchOptions) -> Self {
        Self {
            input: input.into(),
            options,
        }
    }
}

/// Raw answer to a single HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs exactly one request for one file; no retrying.
#[async_trait]
pub trait GrobidTransport: Send + Sync {
    async fn send(&self, item: &WorkItem, pdf: &[u8]) -> Result<TransportResponse, ItemError>;
}

/// [`GrobidTransport`] over HTTP multipart, the service's native protocol.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Build a transport with a client honouring `config.timeout_secs`.
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, GrobidError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GrobidError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client, config: Arc<ClientConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl GrobidTransport for HttpTransport {
    async fn send(&self, item: &WorkItem, pdf: &[u8]) -> Result<TransportResponse, ItemError> {
        let url = self.config.service_url(item.options.service);
        let file_name = item
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());

        let part = Part::bytes(pdf.to_vec())
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| transport_error(item, &e, self.config.timeout_secs))?;

        let mut form = Form::new().part("input", part);
        for (name, value) in form_fields(&item.options.request, &self.config.coordinates) {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/plain")
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(item, &e, self.config.timeout_secs))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(item, &e, self.config.timeout_secs))?;

        Ok(TransportResponse { status, body })
    }
}

fn transport_error(item: &WorkItem, e: &reqwest::Error, timeout_secs: u64) -> ItemError {
    if e.is_timeout() {
        ItemError::Timeout {
            path: item.input.clone(),
            secs: timeout_secs,
        }
    } else {
        ItemError::Transport {
            path: item.input.clone(),
            detail: e.to_string(),
        }
    }
}

/// Translate request flags into form fields.
///
/// A set flag is sent as `"1"`; an unset flag is omitted entirely.
/// `teiCoordinates` repeats once per configured element name.
pub fn form_fields(options: &RequestOptions, coordinates: &[String]) -> Vec<(&'static str, String)> {
    let flags = [
        ("generateIDs", options.generate_ids),
        ("consolidateHeader", options.consolidate_header),
        ("consolidateCitations", options.consolidate_citations),
        ("includeRawCitations", options.include_raw_citations),
        ("includeRawAffiliations", options.include_raw_affiliations),
    ];

    let mut fields: Vec<(&'static str, String)> = flags
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| (name, "1".to_string()))
        .collect();

    if options.tei_coordinates {
        fields.extend(coordinates.iter().map(|c| ("teiCoordinates", c.clone())));
    }
    fields
}

/// Drives one file through the service, retrying on overload.
#[derive(Clone)]
pub struct RemoteCaller {
    transport: Arc<dyn GrobidTransport>,
    config: Arc<ClientConfig>,
}

impl RemoteCaller {
    pub fn new(transport: Arc<dyn GrobidTransport>, config: Arc<ClientConfig>) -> Self {
        Self { transport, config }
    }

    /// Send `item` until the service gives a non-503 answer.
    ///
    /// Returns `Ok` for any final status (check [`CallOutcome::is_success`]);
    /// `Err` when no answer could be obtained or the retry ceiling was hit.
    pub async fn call(&self, item: &WorkItem) -> Result<CallOutcome, ItemError> {
        let start = Instant::now();
        let pdf = tokio::fs::read(&item.input)
            .await
            .map_err(|e| ItemError::ReadFailed {
                path: item.input.clone(),
                detail: e.to_string(),
            })?;

        let mut retries: u32 = 0;
        loop {
            debug!(
                "{}: attempt {} ({} bytes)",
                item.input.display(),
                retries + 1,
                pdf.len()
            );
            let response = self.transport.send(item, &pdf).await?;

            if response.status != OVERLOADED {
                let body = (response.status == OK).then_some(response.body);
                return Ok(CallOutcome {
                    status: response.status,
                    body,
                    retries,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }

            if let Some(max) = self.config.max_retries {
                if retries >= max {
                    return Err(ItemError::RetriesExhausted {
                        path: item.input.clone(),
                        retries,
                    });
                }
            }

            retries += 1;
            let backoff = self.config.retry_backoff_ms;
            warn!(
                "{}: service overloaded (503), retry {} in {}ms",
                item.input.display(),
                retries,
                backoff
            );
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_item_retry(&item.input, retries, backoff);
            }
            sleep(Duration::from_millis(backoff)).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of statuses, then repeats the last one.
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<u16>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedTransport {
        pub(crate) fn new(statuses: &[u16]) -> Self {
            Self {
                script: Mutex::new(statuses.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GrobidTransport for ScriptedTransport {
        async fn send(&self, item: &WorkItem, _pdf: &[u8]) -> Result<TransportResponse, ItemError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let status = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            Ok(TransportResponse {
                status,
                body: format!("<TEI>{}</TEI>", item.input.display()),
            })
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl GrobidTransport for FailingTransport {
        async fn send(&self, item: &WorkItem, _pdf: &[u8]) -> Result<TransportResponse, ItemError> {
            Err(ItemError::Transport {
                path: item.input.clone(),
                detail: "connection refused".into(),
            })
        }
    }

    fn fast_config() -> Arc<ClientConfig> {
        Arc::new(ClientConfig::builder().retry_backoff_ms(1).build().unwrap())
    }

    fn pdf_item(dir: &tempfile::TempDir) -> WorkItem {
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();
        WorkItem::new(path, BatchOptions::default())
    }

    #[test]
    fn form_fields_only_for_set_flags() {
        let coords = vec!["figure".to_string(), "ref".to_string()];
        assert!(form_fields(&RequestOptions::default(), &coords).is_empty());

        let opts = RequestOptions {
            consolidate_header: true,
            include_raw_affiliations: true,
            ..Default::default()
        };
        assert_eq!(
            form_fields(&opts, &coords),
            vec![
                ("consolidateHeader", "1".to_string()),
                ("includeRawAffiliations", "1".to_string()),
            ]
        );
    }

    #[test]
    fn form_fields_coordinates_send_element_names() {
        let coords = vec!["figure".to_string(), "ref".to_string()];
        let opts = RequestOptions {
            tei_coordinates: true,
            generate_ids: true,
            ..Default::default()
        };
        assert_eq!(
            form_fields(&opts, &coords),
            vec![
                ("generateIDs", "1".to_string()),
                ("teiCoordinates", "figure".to_string()),
                ("teiCoordinates", "ref".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn retries_overload_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[503, 503, 200]));
        let caller = RemoteCaller::new(transport.clone(), fast_config());

        let outcome = caller.call(&pdf_item(&dir)).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.retries, 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_status_is_final_without_body() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[400]));
        let caller = RemoteCaller::new(transport.clone(), fast_config());

        let outcome = caller.call(&pdf_item(&dir)).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, 400);
        assert_eq!(outcome.body, None);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_ceiling_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[503]));
        let config = Arc::new(
            ClientConfig::builder()
                .retry_backoff_ms(1)
                .max_retries(3)
                .build()
                .unwrap(),
        );
        let caller = RemoteCaller::new(transport.clone(), config);

        let err = caller.call(&pdf_item(&dir)).await.unwrap_err();
        assert!(matches!(err, ItemError::RetriesExhausted { retries: 3, .. }), "got: {err}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let caller = RemoteCaller::new(Arc::new(FailingTransport), fast_config());
        let err = caller.call(&pdf_item(&dir)).await.unwrap_err();
        assert!(matches!(err, ItemError::Transport { .. }));
    }

    #[tokio::test]
    async fn unreadable_input_fails_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[200]));
        let caller = RemoteCaller::new(transport.clone(), fast_config());
        let item = WorkItem::new(dir.path().join("missing.pdf"), BatchOptions::default());

        let err = caller.call(&item).await.unwrap_err();
        assert!(matches!(err, ItemError::ReadFailed { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
