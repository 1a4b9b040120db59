use crate::error::SinkError;
use crate::record::{Attribute, Level, LogRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output shared between sinks and threads. Holding the lock for the
/// duration of one record keeps its lines contiguous.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Wrap any writer so it can be handed to several sinks.
pub fn shared_writer<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}

/// Destination for [`LogRecord`]s.
///
/// Every sink in this crate (text, JSON file, conditional, interactive,
/// alert, redaction and fan-out) implements this trait, so they compose by
/// wrapping rather than inheritance.
///
/// `with_attrs` and `with_scope` never mutate the receiver: they return a
/// new sink carrying the extended state, and the original stays usable.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Whether a record at `level` would be handled at all.
    fn is_active(&self, level: Level) -> bool;

    /// Handle a single record.
    ///
    /// **Parameters**
    /// - `record`: owned copy of the record; the sink may rewrite it freely.
    /// - `cancel`: fires when the caller no longer wants to wait. Sinks that
    ///   suspend (network, backoff) must return [`SinkError::Cancelled`]
    ///   promptly once it does.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was written, delivered or deliberately ignored.
    /// - `Err(..)` if the backend failed. Callers report it and carry on.
    async fn handle(&self, record: LogRecord, cancel: &CancellationToken) -> Result<(), SinkError>;

    /// Attach attributes to every record handled by the returned sink.
    fn with_attrs(self: Arc<Self>, attrs: Vec<Attribute>) -> Arc<dyn LogSink>;

    /// Nest the keys of subsequently attached attributes under `name`.
    fn with_scope(self: Arc<Self>, name: &str) -> Arc<dyn LogSink>;
}
