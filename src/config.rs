//! Configuration types for batch processing.
//!
//! Two layers of configuration exist:
//!
//! * [`ClientConfig`]: where the service lives and how to talk to it
//!   (host, port, timeout, overload backoff, coordinate elements,
//!   concurrency). Built once per run, then shared read-only by every
//!   in-flight call.
//! * [`BatchOptions`]: what to ask the service for (which endpoint, which
//!   flags) and whether existing outputs are overwritten. Applied uniformly
//!   to every file in a batch.
//!
//! `ClientConfig` can also be loaded from the JSON file format used by the
//! other GROBID clients (`config.json`), see [`ClientConfig::from_file`].

use crate::error::GrobidError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Element names passed as `teiCoordinates` when coordinate extraction is on.
pub const DEFAULT_COORDINATES: &[&str] = &["persName", "figure", "ref", "biblStruct", "formula"];

/// Connection and scheduling configuration for a batch run.
///
/// Built via [`ClientConfig::builder()`], [`ClientConfig::from_file`], or
/// [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use grobid_batch::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .server("grobid.internal")
///     .port(8070)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url(), "http://grobid.internal:8070");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Host name of the service, optionally with an `http://`/`https://`
    /// scheme. Default: `localhost`.
    pub server: String,

    /// TCP port. `None` omits the port from the URL. Default: 8070.
    pub port: Option<u16>,

    /// Number of concurrent in-flight calls. Default: 10.
    ///
    /// The service parses PDFs on a bounded thread pool of its own; going far
    /// beyond its pool size only turns into 503 responses and backoff sleeps.
    pub concurrency: usize,

    /// Fixed delay in milliseconds before retrying a 503 response. Default: 5000.
    pub retry_backoff_ms: u64,

    /// Ceiling on 503 retries per file. Default: `None` (retry until the
    /// service accepts the document).
    pub max_retries: Option<u32>,

    /// Per-request timeout in seconds. Default: 60.
    pub timeout_secs: u64,

    /// Element names sent as `teiCoordinates`. Default: [`DEFAULT_COORDINATES`].
    pub coordinates: Vec<String>,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: Some(8070),
            concurrency: 10,
            retry_backoff_ms: 5000,
            max_retries: None,
            timeout_secs: 60,
            coordinates: DEFAULT_COORDINATES.iter().map(|s| s.to_string()).collect(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("concurrency", &self.concurrency)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("coordinates", &self.coordinates)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// `http://host[:port]`, without a trailing slash.
    pub fn base_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        let mut url = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{server}")
        };
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url
    }

    /// Endpoint URL for one of the processing services.
    pub fn service_url(&self, service: Service) -> String {
        format!("{}/api/{}", self.base_url(), service.as_str())
    }

    /// Endpoint URL of the liveness probe.
    pub fn isalive_url(&self) -> String {
        format!("{}/api/isalive", self.base_url())
    }

    /// Load a JSON config file.
    ///
    /// Recognised keys: `grobid_server`, `grobid_port` (string or number; an
    /// empty string means "no port"), `sleep_time` (seconds), `timeout`
    /// (seconds), `coordinates`, `concurrency`, `max_retries`. `batch_size`
    /// is accepted for compatibility and ignored. Missing keys keep their
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GrobidError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| GrobidError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| GrobidError::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!("Loaded config file {}", path.display());
        file.into_config()
    }

    /// Load `path` if it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, GrobidError> {
        let path = path.as_ref();
        if path.is_file() {
            Self::from_file(path)
        } else {
            info!(
                "Config file {} not found, using default settings",
                path.display()
            );
            Ok(Self::default())
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    pub fn no_port(mut self) -> Self {
        self.config.port = None;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = Some(n);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn coordinates<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.coordinates = elements.into_iter().map(Into::into).collect();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, GrobidError> {
        let c = &self.config;
        if c.server.trim().is_empty() {
            return Err(GrobidError::InvalidConfig("server must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── JSON file format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigFile {
    grobid_server: Option<String>,
    grobid_port: Option<PortValue>,
    sleep_time: Option<f64>,
    timeout: Option<u64>,
    coordinates: Option<Vec<String>>,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl ConfigFile {
    fn into_config(self) -> Result<ClientConfig, GrobidError> {
        let mut builder = ClientConfig::builder();

        if let Some(server) = self.grobid_server {
            builder = builder.server(server);
        }
        match self.grobid_port {
            Some(PortValue::Number(p)) => builder = builder.port(p),
            Some(PortValue::Text(s)) if s.trim().is_empty() => builder = builder.no_port(),
            Some(PortValue::Text(s)) => {
                let p = s.trim().parse::<u16>().map_err(|_| {
                    GrobidError::InvalidConfig(format!("grobid_port '{s}' is not a valid port"))
                })?;
                builder = builder.port(p);
            }
            None => {}
        }
        if let Some(secs) = self.sleep_time {
            if !secs.is_finite() || secs < 0.0 {
                return Err(GrobidError::InvalidConfig(format!(
                    "sleep_time must be a non-negative number of seconds, got {secs}"
                )));
            }
            builder = builder.retry_backoff_ms((secs * 1000.0).round() as u64);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout_secs(secs);
        }
        if let Some(coords) = self.coordinates {
            builder = builder.coordinates(coords);
        }
        if let Some(n) = self.concurrency {
            builder = builder.concurrency(n);
        }
        if let Some(n) = self.max_retries {
            builder = builder.max_retries(n);
        }
        if let Some(n) = self.batch_size {
            debug!("Ignoring batch_size={n}: files are streamed through the pool");
        }

        builder.build()
    }
}

// ── Request options ──────────────────────────────────────────────────────

/// Processing endpoint exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Service {
    /// Full document: header, body, references. (default)
    #[default]
    #[serde(rename = "processFulltextDocument")]
    ProcessFulltextDocument,
    /// Header metadata only.
    #[serde(rename = "processHeaderDocument")]
    ProcessHeaderDocument,
    /// Bibliographical references only.
    #[serde(rename = "processReferences")]
    ProcessReferences,
}

impl Service {
    /// All services, in the order they are listed to users.
    pub const ALL: [Service; 3] = [
        Service::ProcessFulltextDocument,
        Service::ProcessHeaderDocument,
        Service::ProcessReferences,
    ];

    /// Path segment used in `/api/{service}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::ProcessFulltextDocument => "processFulltextDocument",
            Service::ProcessHeaderDocument => "processHeaderDocument",
            Service::ProcessReferences => "processReferences",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = GrobidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|svc| svc.as_str() == s)
            .ok_or_else(|| GrobidError::UnknownService { name: s.to_string() })
    }
}

/// Boolean request flags, each sent to the service only when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Add random `xml:id` attributes to textual elements.
    pub generate_ids: bool,
    /// Consolidate header metadata against an external bibliographic source.
    pub consolidate_header: bool,
    /// Consolidate extracted references.
    pub consolidate_citations: bool,
    /// Keep the raw reference strings in the output.
    pub include_raw_citations: bool,
    /// Keep the raw affiliation strings in the output.
    pub include_raw_affiliations: bool,
    /// Attach bounding-box coordinates to the configured elements.
    pub tei_coordinates: bool,
}

/// Options applied uniformly to every file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    pub service: Service,
    pub request: RequestOptions,
    /// Reprocess inputs even if their TEI output already exists.
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.base_url(), "http://localhost:8070");
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.retry_backoff_ms, 5000);
        assert_eq!(c.max_retries, None);
        assert_eq!(c.coordinates.len(), 5);
    }

    #[test]
    fn service_urls() {
        let c = ClientConfig::builder().server("grobid").port(8280).build().unwrap();
        assert_eq!(
            c.service_url(Service::ProcessHeaderDocument),
            "http://grobid:8280/api/processHeaderDocument"
        );
        assert_eq!(c.isalive_url(), "http://grobid:8280/api/isalive");
    }

    #[test]
    fn url_without_port_and_with_scheme() {
        let c = ClientConfig::builder()
            .server("https://grobid.example.org/")
            .no_port()
            .build()
            .unwrap();
        assert_eq!(c.base_url(), "https://grobid.example.org");
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = ClientConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn empty_server_is_rejected() {
        let err = ClientConfig::builder().server("  ").build().unwrap_err();
        assert!(matches!(err, GrobidError::InvalidConfig(_)));
    }

    #[test]
    fn from_file_reads_legacy_format() {
        let f = write_config(
            r#"{
                "grobid_server": "10.0.0.5",
                "grobid_port": "8280",
                "batch_size": 1000,
                "sleep_time": 2,
                "timeout": 30,
                "coordinates": ["figure", "ref"]
            }"#,
        );
        let c = ClientConfig::from_file(f.path()).unwrap();
        assert_eq!(c.base_url(), "http://10.0.0.5:8280");
        assert_eq!(c.retry_backoff_ms, 2000);
        assert_eq!(c.timeout_secs, 30);
        assert_eq!(c.coordinates, vec!["figure", "ref"]);
        assert_eq!(c.max_retries, None);
    }

    #[test]
    fn from_file_empty_port_means_no_port() {
        let f = write_config(r#"{"grobid_server": "grobid.example.org", "grobid_port": ""}"#);
        let c = ClientConfig::from_file(f.path()).unwrap();
        assert_eq!(c.base_url(), "http://grobid.example.org");
    }

    #[test]
    fn from_file_numeric_port_and_extras() {
        let f = write_config(r#"{"grobid_port": 9000, "concurrency": 3, "max_retries": 7}"#);
        let c = ClientConfig::from_file(f.path()).unwrap();
        assert_eq!(c.port, Some(9000));
        assert_eq!(c.concurrency, 3);
        assert_eq!(c.max_retries, Some(7));
    }

    #[test]
    fn from_file_bad_port() {
        let f = write_config(r#"{"grobid_port": "eighty"}"#);
        let err = ClientConfig::from_file(f.path()).unwrap_err();
        assert!(matches!(err, GrobidError::InvalidConfig(_)), "got: {err}");
    }

    #[test]
    fn from_file_malformed_json() {
        let f = write_config("{ not json");
        let err = ClientConfig::from_file(f.path()).unwrap_err();
        assert!(matches!(err, GrobidError::ConfigParse { .. }), "got: {err}");
    }

    #[test]
    fn load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let c = ClientConfig::load_or_default(dir.path().join("config.json")).unwrap();
        assert_eq!(c.base_url(), "http://localhost:8070");
    }

    #[test]
    fn service_round_trips_through_name() {
        for svc in Service::ALL {
            assert_eq!(svc.as_str().parse::<Service>().unwrap(), svc);
        }
        assert!(matches!(
            "processEverything".parse::<Service>(),
            Err(GrobidError::UnknownService { .. })
        ));
    }
}
