use crate::capabilities::Capabilities;
use crate::error::{BuildError, SinkError};
use crate::formatter::MessageFormatter;
use crate::line_tracker::LineTracker;
use crate::record::{Attribute, Level, LogRecord};
use crate::scope::ScopeState;
use crate::sink::{LogSink, SharedWriter};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SINK_NAME: &str = "InteractiveSink";

/// Dependencies for [`InteractiveSink`]. Every `Option` is required.
#[derive(Clone)]
pub struct InteractiveSinkOptions {
    /// Minimum level to handle.
    pub level: Level,
    /// Console output, typically stderr.
    pub writer: Option<SharedWriter>,
    pub capabilities: Option<Arc<dyn Capabilities>>,
    pub formatter: Option<Arc<dyn MessageFormatter>>,
    /// Position in the machine-readable log, used for error hints.
    pub line_tracker: Option<Arc<dyn LineTracker>>,
}

impl Default for InteractiveSinkOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            writer: None,
            capabilities: None,
            formatter: None,
            line_tracker: None,
        }
    }
}

/// Console sink for a human at a terminal.
///
/// Only active when the environment is interactive. Lines use the full
/// format, timestamp and every attribute. Error records are followed by a
/// hint pointing at the matching region of the log file.
#[derive(Clone)]
pub struct InteractiveSink {
    capabilities: Arc<dyn Capabilities>,
    formatter: Arc<dyn MessageFormatter>,
    line_tracker: Arc<dyn LineTracker>,
    writer: SharedWriter,
    level: Level,
    scope: ScopeState,
}

impl InteractiveSink {
    pub fn new(options: InteractiveSinkOptions) -> Result<Self, BuildError> {
        let writer = options.writer.ok_or(BuildError::WriterRequired { sink: SINK_NAME })?;
        let capabilities =
            options.capabilities.ok_or(BuildError::CapabilitiesRequired { sink: SINK_NAME })?;
        let formatter = options.formatter.ok_or(BuildError::FormatterRequired { sink: SINK_NAME })?;
        let line_tracker =
            options.line_tracker.ok_or(BuildError::LineTrackerRequired { sink: SINK_NAME })?;

        Ok(Self {
            capabilities,
            formatter,
            line_tracker,
            writer,
            level: options.level,
            scope: ScopeState::default(),
        })
    }
}

#[async_trait]
impl LogSink for InteractiveSink {
    fn is_active(&self, level: Level) -> bool {
        self.capabilities.is_interactive() && level >= self.level
    }

    async fn handle(&self, mut record: LogRecord, _cancel: &CancellationToken) -> Result<(), SinkError> {
        if !self.capabilities.is_interactive() {
            return Ok(());
        }

        self.scope.apply(&mut record);
        let use_color = self.capabilities.supports_color();
        let mut message = self.formatter.format_full(&record, use_color);
        message.push('\n');

        // Body and hint go out under one lock so other threads cannot split them.
        let mut writer = self.writer.lock();
        writer.write_all(message.as_bytes())?;

        if record.level >= Level::ERROR {
            let line = i64::try_from(self.line_tracker.current()).unwrap_or(i64::MAX);
            let hint = self.formatter.format_hint(line, use_color);
            if !hint.is_empty() {
                writer.write_all(hint.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn with_attrs(self: Arc<Self>, attrs: Vec<Attribute>) -> Arc<dyn LogSink> {
        if attrs.is_empty() {
            return self;
        }
        Arc::new(Self { scope: self.scope.with_attrs(attrs), ..(*self).clone() })
    }

    fn with_scope(self: Arc<Self>, name: &str) -> Arc<dyn LogSink> {
        if name.is_empty() {
            return self;
        }
        Arc::new(Self { scope: self.scope.with_scope(name), ..(*self).clone() })
    }
}
