//! CLI binary for grobid-batch.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClientConfig`/`BatchOptions` and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use grobid_batch::{
    BatchOptions, BatchProgressCallback, ClientConfig, GrobidClient, ProgressCallback,
    RequestOptions, Service,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// file. Files complete out of order, so start times are keyed by path.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PathBuf, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, input: &Path) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(input))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} PDF files…"))
        ));
    }

    fn on_item_skipped(&self, _input: &Path, output: &Path) {
        self.bar.println(format!(
            "  {} {}  {}",
            dim("–"),
            output.display(),
            dim("exists, skipped")
        ));
    }

    fn on_item_start(&self, input: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(input.to_path_buf(), Instant::now());
        }
    }

    fn on_item_retry(&self, input: &Path, attempt: u32, backoff_ms: u64) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("↻"),
            input.display(),
            dim(&format!(
                "503 overloaded, retry {attempt} in {:.1}s",
                backoff_ms as f64 / 1000.0
            )),
        ));
    }

    fn on_item_complete(&self, input: &Path, output: &Path, bytes: usize) {
        let secs = self.elapsed_secs(input);
        self.bar.println(format!(
            "  {} {} → {}  {}  {}",
            green("✓"),
            input.display(),
            output.display(),
            dim(&format!("{bytes:>8} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, input: &Path, error: &str) {
        let secs = self.elapsed_secs(input);
        let msg = if error.chars().count() > 100 {
            let cut: String = error.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_files.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} files processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files processed  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full-text TEI for every PDF under ./papers, written next to each PDF
  grobid-client processFulltextDocument --input ./papers

  # Mirror the directory tree into ./tei with 20 concurrent requests
  grobid-client processFulltextDocument --input ./papers --output ./tei -n 20

  # Header only, consolidated, for a single file
  grobid-client processHeaderDocument --input paper.pdf --output ./tei --consolidate-header

  # Reprocess everything, with coordinates for figures/refs/...
  grobid-client processFulltextDocument --input ./papers --force --tei-coordinates

CONFIG FILE (./config.json by default, optional):
  {
    "grobid_server": "localhost",
    "grobid_port": "8070",
    "sleep_time": 5,
    "timeout": 60,
    "coordinates": ["persName", "figure", "ref", "biblStruct", "formula"]
  }

  Command-line --server/--port/--sleep-time/--timeout/--max-retries override it.

OVERLOAD:
  When the server answers 503 the file is retried after --sleep-time seconds,
  indefinitely unless --max-retries is given.
"#;

/// Batch client for GROBID: convert PDFs to TEI-XML.
#[derive(Parser, Debug)]
#[command(
    name = "grobid-client",
    version,
    about = "Convert PDF files to TEI-XML through a GROBID server",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Service to call: processFulltextDocument, processHeaderDocument, processReferences.
    service: String,

    /// PDF file, or directory searched recursively for PDFs.
    #[arg(long, env = "GROBID_INPUT")]
    input: PathBuf,

    /// Output directory for TEI files (default: next to each PDF).
    #[arg(long, env = "GROBID_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON config file; ignored if it does not exist.
    #[arg(long, env = "GROBID_CONFIG", default_value = "./config.json")]
    config: PathBuf,

    /// Number of concurrent requests [default: 10, or the config file's value].
    #[arg(short = 'n', long = "concurrency", alias = "n", env = "GROBID_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Server host (overrides the config file).
    #[arg(long, env = "GROBID_SERVER")]
    server: Option<String>,

    /// Server port (overrides the config file).
    #[arg(long, env = "GROBID_PORT")]
    port: Option<u16>,

    /// Seconds to wait before retrying a 503 response.
    #[arg(long, env = "GROBID_SLEEP_TIME")]
    sleep_time: Option<f64>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "GROBID_TIMEOUT")]
    timeout: Option<u64>,

    /// Give up on a file after this many 503 retries (default: never).
    #[arg(long, env = "GROBID_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Add random xml:id attributes to textual elements.
    #[arg(long)]
    generate_ids: bool,

    /// Consolidate header metadata.
    #[arg(long)]
    consolidate_header: bool,

    /// Consolidate extracted bibliographical references.
    #[arg(long)]
    consolidate_citations: bool,

    /// Include raw citation strings.
    #[arg(long)]
    include_raw_citations: bool,

    /// Include raw affiliation strings.
    #[arg(long)]
    include_raw_affiliations: bool,

    /// Add bounding-box coordinates for the configured elements.
    #[arg(long)]
    tei_coordinates: bool,

    /// Reprocess PDFs even if their TEI file already exists.
    #[arg(long)]
    force: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "GROBID_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GROBID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GROBID_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = Instant::now();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let service: Service = cli.service.parse().context("Invalid service")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let client = GrobidClient::new(config).context("Failed to create client")?;
    client
        .check_alive()
        .await
        .context("GROBID server does not appear to be up")?;

    let options = BatchOptions {
        service,
        request: RequestOptions {
            generate_ids: cli.generate_ids,
            consolidate_header: cli.consolidate_header,
            consolidate_citations: cli.consolidate_citations,
            include_raw_citations: cli.include_raw_citations,
            include_raw_affiliations: cli.include_raw_affiliations,
            tei_coordinates: cli.tei_coordinates,
        },
        force: cli.force,
    };

    let report = match client.process(&cli.input, cli.output.as_deref(), options).await {
        Ok(report) => report,
        Err(e) if e.is_nothing_to_do() => {
            eprintln!("{} {}", yellow("⚠"), e);
            if !cli.quiet {
                eprintln!("   runtime {:.3}s", start.elapsed().as_secs_f64());
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("Batch failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &report.stats;
        if stats.total_files == 0 {
            eprintln!("{} No PDF files found under {}", yellow("⚠"), cli.input.display());
        } else if !show_progress {
            eprintln!(
                "Processed {}/{} files ({} failed, {} skipped)",
                stats.processed,
                report.items.len(),
                stats.failed,
                stats.skipped
            );
        }
        eprintln!(
            "   {} retries on overload, runtime {:.3}s",
            dim(&stats.total_retries.to_string()),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

/// Config file first, then CLI overrides.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClientConfig> {
    let base = ClientConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    let mut builder = ClientConfig::builder()
        .server(cli.server.clone().unwrap_or(base.server))
        .concurrency(cli.concurrency.unwrap_or(base.concurrency))
        .retry_backoff_ms(
            cli.sleep_time
                .map(|s| (s.max(0.0) * 1000.0).round() as u64)
                .unwrap_or(base.retry_backoff_ms),
        )
        .timeout_secs(cli.timeout.unwrap_or(base.timeout_secs))
        .coordinates(base.coordinates);

    builder = match cli.port.or(base.port) {
        Some(p) => builder.port(p),
        None => builder.no_port(),
    };
    if let Some(n) = cli.max_retries.or(base.max_retries) {
        builder = builder.max_retries(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
