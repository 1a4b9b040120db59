use crate::error::SinkError;
use crate::record::{Attribute, Level, LogRecord};
use crate::sink::LogSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle passed explicitly to the code that logs.
///
/// Cheap to clone. Derived loggers from [`with_attrs`](Self::with_attrs) and
/// [`with_scope`](Self::with_scope) share the cancellation token of their
/// parent, so cancelling it aborts any pending webhook delivery.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    cancel: CancellationToken,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.sink.is_active(level)
    }

    /// Build a record and hand it to the sink. Nothing is built when no sink
    /// is active for `level`.
    pub async fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        attrs: Vec<Attribute>,
    ) -> Result<(), SinkError> {
        if !self.sink.is_active(level) {
            return Ok(());
        }
        let record = LogRecord::new(level, message).with_attrs(attrs);
        self.sink.handle(record, &self.cancel).await
    }

    pub async fn debug(&self, message: impl Into<String>, attrs: Vec<Attribute>) -> Result<(), SinkError> {
        self.log(Level::DEBUG, message, attrs).await
    }

    pub async fn info(&self, message: impl Into<String>, attrs: Vec<Attribute>) -> Result<(), SinkError> {
        self.log(Level::INFO, message, attrs).await
    }

    pub async fn warn(&self, message: impl Into<String>, attrs: Vec<Attribute>) -> Result<(), SinkError> {
        self.log(Level::WARN, message, attrs).await
    }

    pub async fn error(&self, message: impl Into<String>, attrs: Vec<Attribute>) -> Result<(), SinkError> {
        self.log(Level::ERROR, message, attrs).await
    }

    pub fn with_attrs(&self, attrs: Vec<Attribute>) -> Logger {
        Logger { sink: Arc::clone(&self.sink).with_attrs(attrs), cancel: self.cancel.clone() }
    }

    pub fn with_scope(&self, name: &str) -> Logger {
        Logger { sink: Arc::clone(&self.sink).with_scope(name), cancel: self.cancel.clone() }
    }
}
