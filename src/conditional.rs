use crate::capabilities::Capabilities;
use crate::error::{BuildError, SinkError};
use crate::record::{Attribute, Level, LogRecord};
use crate::sink::{LogSink, SharedWriter};
use crate::text::TextSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SINK_NAME: &str = "ConditionalSink";

/// Gate that forwards to a plain sink only when the environment is not
/// interactive. The interactive console is served by
/// [`InteractiveSink`](crate::interactive::InteractiveSink) instead.
pub struct ConditionalSink {
    capabilities: Arc<dyn Capabilities>,
    inner: Arc<dyn LogSink>,
}

impl ConditionalSink {
    /// **Returns**
    /// - `Err(BuildError::CapabilitiesRequired)` / `Err(BuildError::InnerSinkRequired)`
    ///   when either dependency is missing.
    pub fn new(
        capabilities: Option<Arc<dyn Capabilities>>,
        inner: Option<Arc<dyn LogSink>>,
    ) -> Result<Self, BuildError> {
        let capabilities = capabilities.ok_or(BuildError::CapabilitiesRequired { sink: SINK_NAME })?;
        let inner = inner.ok_or(BuildError::InnerSinkRequired { sink: SINK_NAME })?;
        Ok(Self { capabilities, inner })
    }

    /// Gate a [`TextSink`] writing to `writer` at `level`.
    pub fn text(
        capabilities: Option<Arc<dyn Capabilities>>,
        writer: Option<SharedWriter>,
        level: Level,
    ) -> Result<Self, BuildError> {
        let writer = writer.ok_or(BuildError::WriterRequired { sink: SINK_NAME })?;
        Self::new(capabilities, Some(Arc::new(TextSink::new(writer, level))))
    }
}

#[async_trait]
impl LogSink for ConditionalSink {
    fn is_active(&self, level: Level) -> bool {
        !self.capabilities.is_interactive() && self.inner.is_active(level)
    }

    async fn handle(&self, record: LogRecord, cancel: &CancellationToken) -> Result<(), SinkError> {
        if self.capabilities.is_interactive() {
            return Ok(());
        }
        self.inner.handle(record, cancel).await
    }

    fn with_attrs(self: Arc<Self>, attrs: Vec<Attribute>) -> Arc<dyn LogSink> {
        Arc::new(Self {
            capabilities: Arc::clone(&self.capabilities),
            inner: Arc::clone(&self.inner).with_attrs(attrs),
        })
    }

    fn with_scope(self: Arc<Self>, name: &str) -> Arc<dyn LogSink> {
        Arc::new(Self {
            capabilities: Arc::clone(&self.capabilities),
            inner: Arc::clone(&self.inner).with_scope(name),
        })
    }
}
