use crate::error::SinkError;
use crate::record::{Attribute, Level, LogRecord};
use crate::sink::LogSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A sink that accepts every level and drops every record.
///
/// Useful for measuring the overhead of redaction and fan-out without any
/// I/O, and as a placeholder child in tests.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    fn is_active(&self, _level: Level) -> bool {
        true
    }

    async fn handle(&self, _record: LogRecord, _cancel: &CancellationToken) -> Result<(), SinkError> {
        Ok(())
    }

    fn with_attrs(self: Arc<Self>, _attrs: Vec<Attribute>) -> Arc<dyn LogSink> {
        self
    }

    fn with_scope(self: Arc<Self>, _name: &str) -> Arc<dyn LogSink> {
        self
    }
}
