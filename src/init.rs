use crate::alert::AlertSink;
use crate::backoff::BackoffPolicy;
use crate::capabilities::Capabilities;
use crate::conditional::ConditionalSink;
use crate::env::{
    env_non_empty, local_hostname, SECURE_LOG_DIR_ENV, SECURE_LOG_LEVEL_ENV, SECURE_LOG_RUN_ID_ENV,
    SECURE_LOG_WEBHOOK_URL_ENV,
};
use crate::error::BuildError;
use crate::fanout::FanOutSink;
use crate::formatter::DefaultMessageFormatter;
use crate::interactive::{InteractiveSink, InteractiveSinkOptions};
use crate::json::JsonFileSink;
use crate::layer::ForwardingLayer;
use crate::line_tracker::{AtomicLineTracker, LineTracker};
use crate::logger::Logger;
use crate::record::{Attribute, Level};
use crate::redaction::{RedactingSink, RedactionConfig};
use crate::schema;
use crate::sink::{shared_writer, LogSink, SharedWriter};
use crate::webhook::WebhookTransport;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Settings for [`build_pipeline`].
///
/// **Fields**
/// - `level`: minimum level for every console and file sink. The alert sink
///   always starts at INFO.
/// - `run_id`: stamped on JSON lines and alerts.
/// - `webhook_url`: enables the alert sink when set.
/// - `redaction`: `None` uses [`RedactionConfig::standard`].
/// - `log_dir`: directory for the per-run JSON log, used when no file writer
///   is passed to [`build_pipeline`].
/// - `channel_buffer`: queue size of the tracing bridge.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub level: Level,
    pub run_id: String,
    pub webhook_url: Option<String>,
    pub backoff: BackoffPolicy,
    pub redaction: Option<RedactionConfig>,
    pub log_dir: Option<PathBuf>,
    pub channel_buffer: usize,
    /// Level string from the environment that did not parse.
    pub unparsed_level: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            run_id: new_run_id(),
            webhook_url: None,
            backoff: BackoffPolicy::default(),
            redaction: None,
            log_dir: None,
            channel_buffer: 1024,
            unparsed_level: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the `SECURE_LOG_*` variables in [`crate::env`].
    pub fn from_env() -> Self {
        Self::from_lookup(env_non_empty)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(SECURE_LOG_LEVEL_ENV) {
            match Level::parse(&raw) {
                Some(level) => config.level = level,
                None => config.unparsed_level = Some(raw),
            }
        }
        if let Some(run_id) = lookup(SECURE_LOG_RUN_ID_ENV) {
            config.run_id = run_id;
        }
        config.webhook_url = lookup(SECURE_LOG_WEBHOOK_URL_ENV);
        config.log_dir = lookup(SECURE_LOG_DIR_ENV).map(PathBuf::from);
        config
    }
}

/// Output streams for the pipeline. Missing ones fall back as documented.
#[derive(Clone, Default)]
pub struct PipelineWriters {
    /// Machine-readable JSON log. When `None`, a file is created in
    /// [`PipelineConfig::log_dir`] if set, otherwise there is no JSON log.
    pub log_file: Option<SharedWriter>,
    /// Interactive console output. Required when the environment is interactive.
    pub console: Option<SharedWriter>,
    /// Plain text output for redirected runs. Always required.
    pub output: Option<SharedWriter>,
}

impl PipelineWriters {
    /// Console on stderr, plain text on stdout, no log file.
    pub fn stdio() -> Self {
        Self {
            log_file: None,
            console: Some(shared_writer(std::io::stderr())),
            output: Some(shared_writer(std::io::stdout())),
        }
    }

    pub fn with_log_file(mut self, writer: SharedWriter) -> Self {
        self.log_file = Some(writer);
        self
    }
}

/// A built pipeline.
pub struct Pipeline {
    pub logger: Logger,
    /// Shared by the JSON file sink and the interactive hints.
    pub line_tracker: Arc<dyn LineTracker>,
    /// Path of the JSON log when one was created from `log_dir`.
    pub log_path: Option<PathBuf>,
    pub run_id: String,
}

/// Fresh run identifier (UUID v4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `<hostname>_<UTC timestamp>_<run_id>.json`
pub fn log_file_name(hostname: &str, started: DateTime<Utc>, run_id: &str) -> String {
    format!("{}_{}_{}.json", hostname, started.format("%Y%m%dT%H%M%SZ"), run_id)
}

fn open_log_file(dir: &Path, hostname: &str, run_id: &str) -> Result<(PathBuf, File), BuildError> {
    let path = dir.join(log_file_name(hostname, Utc::now(), run_id));
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(&path)?;
    Ok((path, file))
}

/// Assemble the full pipeline.
///
/// Order inside the router: JSON file, interactive console, plain text,
/// webhook alerts. The file comes first so an error hint on the console
/// names the line that was just written. Everything is wrapped in a
/// [`RedactingSink`].
///
/// **Returns**
/// - `Err(BuildError)` for a missing writer, an invalid webhook URL, a bad
///   redaction pattern or a log file that cannot be created.
pub fn build_pipeline(
    config: PipelineConfig,
    capabilities: Arc<dyn Capabilities>,
    writers: PipelineWriters,
) -> Result<Pipeline, BuildError> {
    build_pipeline_with_transport(config, capabilities, writers, None)
}

/// [`build_pipeline`] with a custom webhook transport for the alert sink.
pub fn build_pipeline_with_transport(
    config: PipelineConfig,
    capabilities: Arc<dyn Capabilities>,
    writers: PipelineWriters,
    transport: Option<Arc<dyn WebhookTransport>>,
) -> Result<Pipeline, BuildError> {
    let hostname = local_hostname();
    let line_tracker: Arc<dyn LineTracker> = Arc::new(AtomicLineTracker::new());
    let mut children: Vec<Arc<dyn LogSink>> = Vec::new();

    let mut log_path = None;
    let log_file = match (writers.log_file, &config.log_dir) {
        (Some(writer), _) => Some(writer),
        (None, Some(dir)) => {
            let (path, file) = open_log_file(dir, &hostname, &config.run_id)?;
            log_path = Some(path);
            Some(shared_writer(file))
        }
        (None, None) => None,
    };

    if let Some(writer) = log_file {
        let json: Arc<dyn LogSink> =
            Arc::new(JsonFileSink::new(writer, config.level).with_line_tracker(Arc::clone(&line_tracker)));
        children.push(json.with_attrs(vec![
            Attribute::new(schema::HOSTNAME, hostname.as_str()),
            Attribute::new(schema::PID, i64::from(std::process::id())),
            Attribute::new(schema::SCHEMA_VERSION, schema::CURRENT_SCHEMA_VERSION),
            Attribute::new(schema::RUN_ID, config.run_id.as_str()),
        ]));
    }

    if capabilities.is_interactive() {
        let interactive = InteractiveSink::new(InteractiveSinkOptions {
            level: config.level,
            writer: writers.console,
            capabilities: Some(Arc::clone(&capabilities)),
            formatter: Some(Arc::new(DefaultMessageFormatter::new())),
            line_tracker: Some(Arc::clone(&line_tracker)),
        })?;
        children.push(Arc::new(interactive));
    }

    children.push(Arc::new(ConditionalSink::text(
        Some(Arc::clone(&capabilities)),
        writers.output,
        config.level,
    )?));

    let webhook_url = config.webhook_url.as_deref().filter(|url| !url.trim().is_empty());
    if let Some(url) = webhook_url {
        let alert = match transport {
            Some(transport) => AlertSink::with_transport(url, &config.run_id, config.backoff, transport)?,
            None => default_alert_sink(url, &config.run_id, config.backoff)?,
        };
        children.push(Arc::new(alert));
    }

    let redaction = match config.redaction {
        Some(redaction) => redaction,
        None => RedactionConfig::standard()?,
    };
    let router: Arc<dyn LogSink> = Arc::new(FanOutSink::new(children));
    let root: Arc<dyn LogSink> = Arc::new(RedactingSink::new(router, redaction));

    if let Some(raw) = &config.unparsed_level {
        warn!(value = %raw, "unknown log level, using INFO");
    }
    info!(
        run_id = %config.run_id,
        interactive = capabilities.is_interactive(),
        color = capabilities.supports_color(),
        alerts_enabled = webhook_url.is_some(),
        "log pipeline initialized"
    );

    Ok(Pipeline {
        logger: Logger::new(root),
        line_tracker,
        log_path,
        run_id: config.run_id,
    })
}

#[cfg(feature = "webhook")]
fn default_alert_sink(url: &str, run_id: &str, backoff: BackoffPolicy) -> Result<AlertSink, BuildError> {
    AlertSink::new(url, run_id, backoff)
}

#[cfg(not(feature = "webhook"))]
fn default_alert_sink(_url: &str, _run_id: &str, _backoff: BackoffPolicy) -> Result<AlertSink, BuildError> {
    Err(BuildError::HttpClient("built without the `webhook` feature".to_string()))
}

/// Settings for [`install_tracing_bridge`].
///
/// **Fields**
/// - `channel_buffer`: records queued before new ones are dropped.
/// - `level`: minimum level forwarded from `tracing`.
/// - `enable_stdout`: also print events with `tracing_subscriber::fmt`.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { channel_buffer: 1024, level: Level::INFO, enable_stdout: false }
    }
}

impl From<&PipelineConfig> for LayerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self { channel_buffer: config.channel_buffer, level: config.level, ..Self::default() }
    }
}

/// Background side of an installed bridge.
pub struct TracingBridge {
    pub task: JoinHandle<()>,
    /// Cancel to abort webhook deliveries still in flight at shutdown.
    pub cancel: CancellationToken,
    pub dropped_events: Arc<AtomicU64>,
}

/// Install a [`ForwardingLayer`] over `sink` as the global `tracing`
/// subscriber. Must be called inside a Tokio runtime, at most once per process.
pub fn install_tracing_bridge(sink: Arc<dyn LogSink>, config: LayerConfig) -> Result<TracingBridge, BuildError> {
    let (layer, task) = ForwardingLayer::new(sink, config.channel_buffer, config.level);
    let cancel = layer.cancellation();
    let dropped_events = Arc::clone(&layer.dropped_events);

    let installed = if config.enable_stdout {
        let subscriber = Registry::default().with(layer).with(tracing_subscriber::fmt::layer());
        tracing::subscriber::set_global_default(subscriber)
    } else {
        tracing::subscriber::set_global_default(Registry::default().with(layer))
    };
    installed.map_err(|err| BuildError::Subscriber(err.to_string()))?;

    Ok(TracingBridge { task, cancel, dropped_events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticCapabilities;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("SECURE_LOG_LEVEL", "debug"),
            ("SECURE_LOG_RUN_ID", "run-9"),
            ("SECURE_LOG_WEBHOOK_URL", "https://hooks.example.com/x"),
            ("SECURE_LOG_DIR", "/var/log/runner"),
        ]));
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.run_id, "run-9");
        assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example.com/x"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/runner")));
        assert!(config.unparsed_level.is_none());
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let config = PipelineConfig::from_lookup(lookup(&[("SECURE_LOG_LEVEL", "loud")]));
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.unparsed_level.as_deref(), Some("loud"));
        assert!(uuid::Uuid::parse_str(&config.run_id).is_ok());
    }

    #[test]
    fn log_file_name_layout() {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        assert_eq!(log_file_name("box", started, "r1"), "box_20240501T123005Z_r1.json");
    }

    #[test]
    fn construction_errors_surface_before_logging() {
        let interactive: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::interactive(false));
        let writers = PipelineWriters { output: Some(shared_writer(Vec::new())), ..Default::default() };
        assert!(matches!(
            build_pipeline(PipelineConfig::default(), interactive, writers.clone()),
            Err(BuildError::WriterRequired { .. })
        ));

        let plain: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::non_interactive());
        let config = PipelineConfig {
            webhook_url: Some("http://insecure.example.com/hook".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_pipeline(config, plain, writers),
            Err(BuildError::InvalidWebhookUrl(_))
        ));
    }

    #[tokio::test]
    async fn custom_redaction_replaces_the_standard_set() {
        let file = Arc::new(parking_lot::Mutex::new(Vec::<u8>::new()));
        let config = PipelineConfig {
            redaction: Some(RedactionConfig::new(Vec::<String>::new(), &["ssn"]).unwrap()),
            ..Default::default()
        };
        let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::non_interactive());
        let writers = PipelineWriters {
            log_file: Some(file.clone()),
            output: Some(shared_writer(Vec::new())),
            ..Default::default()
        };

        let pipeline = build_pipeline(config, caps, writers).unwrap();
        pipeline
            .logger
            .info("x", vec![Attribute::new("user_ssn", "1"), Attribute::new("password", "p")])
            .await
            .unwrap();

        let text = String::from_utf8(file.lock().clone()).unwrap();
        assert!(text.contains("\"user_ssn\":\"***\""));
        assert!(text.contains("\"password\":\"p\""));
    }

    #[test]
    fn log_dir_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            run_id: "run-1".into(),
            log_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::non_interactive());
        let writers = PipelineWriters { output: Some(shared_writer(Vec::new())), ..Default::default() };

        let pipeline = build_pipeline(config, caps, writers).unwrap();
        let path = pipeline.log_path.unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_run-1.json"));
    }
}
