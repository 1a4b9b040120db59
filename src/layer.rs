use crate::record::{Attribute, Level, LogRecord, Value};
use crate::sink::LogSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target prefix of this crate's own diagnostics, which are never forwarded.
const OWN_TARGET: &str = "secure_log_sink";

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a [`LogSink`] through a bounded channel and background task.
///
/// Application threads never wait on sink I/O: when the channel is full the
/// event is counted in `dropped_events` and discarded.
pub struct ForwardingLayer {
    sender: mpsc::Sender<LogRecord>,
    min_level: Level,
    cancel: CancellationToken,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full or closed.
    pub dropped_events: Arc<AtomicU64>,
}

impl ForwardingLayer {
    /// Create the layer and spawn the task that drains the channel into `sink`.
    ///
    /// Must be called inside a Tokio runtime. `buffer` is raised to at least 16.
    pub fn new(sink: Arc<dyn LogSink>, buffer: usize, min_level: Level) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LogRecord>(buffer.max(16));
        let cancel = CancellationToken::new();

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let cancel_bg = cancel.clone();
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = sink.handle(record, &cancel_bg).await {
                    tracing::warn!(error = %err, "log sink failed to handle forwarded event");
                }
            }
        });

        (
            Self {
                sender: tx,
                min_level,
                cancel,
                total_events,
                enqueued_events,
                dropped_events,
            },
            handle,
        )
    }

    /// Token passed to every `handle` call; cancel it to abort pending deliveries.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn to_record(event: &Event<'_>) -> LogRecord {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(Level::from(*meta.level()), visitor.message.unwrap_or_default());
        record.attrs = visitor.attrs;
        record.attrs.push(Attribute::new("target", meta.target()));
        record
    }
}

impl<S> Layer<S> for ForwardingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) || Level::from(*meta.level()) < self.min_level {
            return;
        }

        match self.sender.try_send(Self::to_record(event)) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    attrs: Vec<Attribute>,
    message: Option<String>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        self.attrs.push(Attribute { key: field.name().to_string(), value });
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let value = i64::try_from(value).map_or_else(|_| Value::String(value.to_string()), Value::Int);
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, Value::String(format!("{:?}", value)));
        }
    }
}
