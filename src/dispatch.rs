//! Batch dispatch: bounded fan-out of files to the service.
//!
//! A run has three phases:
//!
//! 1. **Plan**: resolve every output path up front and drop files whose
//!    output already exists (unless `force` is set).
//! 2. **Dispatch**: push the remaining files through
//!    [`RemoteCaller::call`] with at most `concurrency` calls in flight
//!    (`buffer_unordered`). Completions arrive in any order. The phase
//!    returns only when every submitted call has finished.
//! 3. **Write**: hand each completion and its output path to
//!    [`writer::write_tei`]. A failure is recorded on that file's
//!    [`ItemResult`] and never stops the others.

use crate::config::ClientConfig;
use crate::error::ItemError;
use crate::output::{BatchReport, BatchStats, CallOutcome, ItemResult};
use crate::pipeline::path;
use crate::pipeline::remote::{RemoteCaller, WorkItem};
use crate::pipeline::writer;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A file scheduled for submission together with its output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub item: WorkItem,
    pub output: PathBuf,
}

/// Terminal result of one submitted job, before writing.
#[derive(Debug, Clone)]
pub struct Completion {
    pub job: Job,
    pub outcome: Result<CallOutcome, ItemError>,
}

/// Owns the concurrency bound and the caller shared by every job.
#[derive(Clone)]
pub struct BatchDispatcher {
    caller: RemoteCaller,
    config: Arc<ClientConfig>,
}

impl BatchDispatcher {
    pub fn new(caller: RemoteCaller, config: Arc<ClientConfig>) -> Self {
        Self { caller, config }
    }

    /// Resolve output paths and split items into jobs and skipped inputs.
    pub async fn plan(
        &self,
        items: Vec<WorkItem>,
        input_root: &Path,
        output_root: Option<&Path>,
    ) -> (Vec<Job>, Vec<PathBuf>) {
        let mut jobs = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();

        for item in items {
            let output = path::resolve(&item.input, input_root, output_root);
            if !item.options.force && is_file(&output).await {
                info!(
                    "{} already exists, skipping (use --force to reprocess)",
                    output.display()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_item_skipped(&item.input, &output);
                }
                skipped.push(item.input);
                continue;
            }
            jobs.push(Job { item, output });
        }

        (jobs, skipped)
    }

    /// Run every job through the service, at most `concurrency` at a time.
    ///
    /// Returns once all jobs have a terminal outcome, in completion order.
    pub async fn dispatch(&self, jobs: Vec<Job>) -> Vec<Completion> {
        stream::iter(jobs.into_iter().map(|job| {
            let caller = self.caller.clone();
            let cb = self.config.progress_callback.clone();
            async move {
                if let Some(ref cb) = cb {
                    cb.on_item_start(&job.item.input);
                }
                let outcome = caller.call(&job.item).await;
                Completion { job, outcome }
            }
        }))
        .buffer_unordered(self.config.concurrency.max(1))
        .collect()
        .await
    }

    /// Plan, dispatch and write a whole batch.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        input_root: &Path,
        output_root: Option<&Path>,
    ) -> BatchReport {
        let start = Instant::now();
        let total_files = items.len();

        let (jobs, skipped) = self.plan(items, input_root, output_root).await;
        let submitted = jobs.len();
        info!(
            "{} files to process ({} skipped), concurrency {}",
            submitted,
            skipped.len(),
            self.config.concurrency
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(submitted);
        }

        let completions = self.dispatch(jobs).await;
        debug!("All {} calls finished, writing results", completions.len());

        let mut items = Vec::with_capacity(completions.len());
        for completion in completions {
            items.push(self.finish(completion).await);
        }

        let processed = items.iter().filter(|i| i.is_success()).count();
        let stats = BatchStats {
            total_files,
            processed,
            failed: items.len() - processed,
            skipped: skipped.len(),
            total_retries: items.iter().map(|i| i.retries as u64).sum(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Batch complete: {}/{} written, {} failed, {} skipped, {}ms",
            stats.processed, submitted, stats.failed, stats.skipped, stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(submitted, processed);
        }

        BatchReport {
            items,
            skipped,
            stats,
        }
    }

    /// Write a completion's body (if any) and turn it into an [`ItemResult`].
    async fn finish(&self, completion: Completion) -> ItemResult {
        let Completion { job, outcome } = completion;
        let Job { item, output } = job;

        let mut result = ItemResult {
            input: item.input,
            output,
            status: None,
            retries: 0,
            duration_ms: 0,
            bytes_written: 0,
            error: None,
        };

        match outcome {
            Ok(call) => {
                result.status = Some(call.status);
                result.retries = call.retries;
                result.duration_ms = call.duration_ms;
                match call.body {
                    Some(body) => match writer::write_tei(&result.output, &body).await {
                        Ok(n) => result.bytes_written = n,
                        Err(e) => result.error = Some(e),
                    },
                    None => {
                        result.error = Some(ItemError::Rejected {
                            path: result.input.clone(),
                            status: call.status,
                        })
                    }
                }
            }
            Err(e) => {
                result.status = e.status();
                if let ItemError::RetriesExhausted { retries, .. } = e {
                    result.retries = retries;
                }
                result.error = Some(e);
            }
        }

        match result.error {
            None => {
                info!(
                    "Processed {} -> {}",
                    result.input.display(),
                    result.output.display()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_item_complete(&result.input, &result.output, result.bytes_written);
                }
            }
            Some(ref e) => {
                warn!("{}", e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_item_error(&result.input, &e.to_string());
                }
            }
        }

        result
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchOptions;
    use crate::pipeline::remote::tests::ScriptedTransport;
    use crate::pipeline::remote::{GrobidTransport, TransportResponse};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the highest number of simultaneous `send` calls.
    #[derive(Default)]
    struct GaugeTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GrobidTransport for GaugeTransport {
        async fn send(&self, _item: &WorkItem, _pdf: &[u8]) -> Result<TransportResponse, ItemError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TransportResponse {
                status: 200,
                body: "<TEI/>".into(),
            })
        }
    }

    fn dispatcher(transport: Arc<dyn GrobidTransport>, concurrency: usize) -> BatchDispatcher {
        let config = Arc::new(
            ClientConfig::builder()
                .concurrency(concurrency)
                .retry_backoff_ms(1)
                .build()
                .unwrap(),
        );
        BatchDispatcher::new(RemoteCaller::new(transport, config.clone()), config)
    }

    fn make_pdfs(root: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let p = root.join(name);
                fs::create_dir_all(p.parent().unwrap()).unwrap();
                fs::write(&p, b"%PDF-1.4").unwrap();
                p
            })
            .collect()
    }

    fn items(paths: &[PathBuf], force: bool) -> Vec<WorkItem> {
        let options = BatchOptions {
            force,
            ..Default::default()
        };
        paths.iter().map(|p| WorkItem::new(p, options)).collect()
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_bound() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let pdfs = make_pdfs(&input, &["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"]);
        let transport = Arc::new(GaugeTransport::default());
        let d = dispatcher(transport.clone(), 2);

        let out = dir.path().join("out");
        let report = d.run(items(&pdfs, false), &input, Some(&out)).await;

        assert_eq!(report.items.len(), 5);
        assert_eq!(report.stats.processed, 5);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
        assert!(out.join("3.tei.xml").is_file());
    }

    #[tokio::test]
    async fn serial_dispatch_with_concurrency_one() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = make_pdfs(dir.path(), &["1.pdf", "2.pdf", "3.pdf"]);
        let transport = Arc::new(GaugeTransport::default());
        let d = dispatcher(transport.clone(), 1);

        let report = d.run(items(&pdfs, false), dir.path(), None).await;

        assert_eq!(report.stats.processed, 3);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    }

    /// Answers 503 to the first request for `slow.pdf`, 200 to everything else.
    #[derive(Default)]
    struct OverloadedOnceTransport {
        overloaded: AtomicBool,
    }

    #[async_trait]
    impl GrobidTransport for OverloadedOnceTransport {
        async fn send(&self, item: &WorkItem, _pdf: &[u8]) -> Result<TransportResponse, ItemError> {
            let slow = item.input.file_name().is_some_and(|n| n == "slow.pdf");
            let status = if slow && !self.overloaded.swap(true, Ordering::SeqCst) {
                503
            } else {
                200
            };
            Ok(TransportResponse {
                status,
                body: "<TEI/>".into(),
            })
        }
    }

    #[tokio::test]
    async fn overload_backoff_holds_only_its_own_slot() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = make_pdfs(dir.path(), &["slow.pdf", "a.pdf", "b.pdf", "c.pdf"]);
        let config = Arc::new(
            ClientConfig::builder()
                .concurrency(2)
                .retry_backoff_ms(200)
                .build()
                .unwrap(),
        );
        let transport: Arc<dyn GrobidTransport> = Arc::new(OverloadedOnceTransport::default());
        let d = BatchDispatcher::new(RemoteCaller::new(transport, config.clone()), config);

        let report = d.run(items(&pdfs, false), dir.path(), None).await;

        assert_eq!(report.stats.processed, 4);
        assert_eq!(report.stats.total_retries, 1);
        // Completion order: the other files finish while slow.pdf sleeps.
        let last = report.items.last().unwrap();
        assert_eq!(last.input, pdfs[0]);
        assert_eq!(last.retries, 1);
        assert!(report.items[..3].iter().all(|i| i.retries == 0));
    }

    #[tokio::test]
    async fn existing_output_is_skipped_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = make_pdfs(dir.path(), &["a.pdf", "b.pdf"]);
        fs::write(dir.path().join("a.tei.xml"), "done").unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[200]));
        let d = dispatcher(transport.clone(), 4);

        let report = d.run(items(&pdfs, false), dir.path(), None).await;

        assert_eq!(report.skipped, vec![pdfs[0].clone()]);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.items.len(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.tei.xml")).unwrap(), "done");
    }

    #[tokio::test]
    async fn force_resubmits_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = make_pdfs(dir.path(), &["a.pdf"]);
        fs::write(dir.path().join("a.tei.xml"), "stale").unwrap();
        let transport = Arc::new(ScriptedTransport::new(&[200]));
        let d = dispatcher(transport.clone(), 4);

        let report = d.run(items(&pdfs, true), dir.path(), None).await;

        assert!(report.skipped.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let written = fs::read_to_string(dir.path().join("a.tei.xml")).unwrap();
        assert!(written.starts_with("<TEI>"), "got: {written}");
    }

    #[tokio::test]
    async fn rejected_item_writes_nothing_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let pdfs = make_pdfs(dir.path(), &["bad.pdf"]);
        let d = dispatcher(Arc::new(ScriptedTransport::new(&[500])), 2);

        let report = d.run(items(&pdfs, false), dir.path(), None).await;

        assert_eq!(report.stats.failed, 1);
        let item = &report.items[0];
        assert_eq!(item.status, Some(500));
        assert!(matches!(item.error, Some(ItemError::Rejected { status: 500, .. })));
        assert!(!dir.path().join("bad.tei.xml").exists());
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let pdfs = make_pdfs(&input, &["sub/x.pdf", "y.pdf"]);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("sub"), "not a directory").unwrap();
        let d = dispatcher(Arc::new(ScriptedTransport::new(&[200])), 2);

        let report = d.run(items(&pdfs, false), &input, Some(&out)).await;

        assert_eq!(report.stats.processed, 1);
        assert_eq!(report.stats.failed, 1);
        let failed = report.failures().next().unwrap();
        assert_eq!(failed.input, pdfs[0]);
        assert!(matches!(failed.error, Some(ItemError::WriteFailed { .. })));
        assert!(out.join("y.tei.xml").is_file());
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(Arc::new(ScriptedTransport::new(&[200])), 2);
        let report = d.run(Vec::new(), dir.path(), None).await;
        assert!(report.items.is_empty());
        assert_eq!(report.stats.total_files, 0);
        assert_eq!(report.stats.processed, 0);
        assert_eq!(report.stats.failed, 0);
    }
}
