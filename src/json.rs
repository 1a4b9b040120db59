use crate::error::SinkError;
use crate::line_tracker::LineTracker;
use crate::record::{Attribute, Level, LogRecord};
use crate::scope::ScopeState;
use crate::sink::{LogSink, SharedWriter};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Machine-readable per-run log: one JSON object per line.
///
/// When a [`LineTracker`] is attached, it is advanced for every line while
/// the writer lock is held, so the tracker's count always equals the number
/// of lines in the file.
#[derive(Clone)]
pub struct JsonFileSink {
    writer: SharedWriter,
    level: Level,
    line_tracker: Option<Arc<dyn LineTracker>>,
    scope: ScopeState,
}

impl JsonFileSink {
    pub fn new(writer: SharedWriter, level: Level) -> Self {
        Self { writer, level, line_tracker: None, scope: ScopeState::default() }
    }

    pub fn with_line_tracker(mut self, tracker: Arc<dyn LineTracker>) -> Self {
        self.line_tracker = Some(tracker);
        self
    }

    fn encode(record: &LogRecord) -> Result<String, serde_json::Error> {
        let mut object = Map::new();
        object.insert(
            "time".to_string(),
            JsonValue::String(record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        );
        object.insert("level".to_string(), JsonValue::String(record.level.to_string()));
        object.insert("msg".to_string(), JsonValue::String(record.message.clone()));
        for attr in &record.attrs {
            let key = free_key(&object, &attr.key);
            object.insert(key, serde_json::to_value(&attr.value)?);
        }
        let mut line = serde_json::to_string(&object)?;
        line.push('\n');
        Ok(line)
    }
}

/// `key` if unused, otherwise `attr.key`, `attr.key#2`, ... so neither the
/// header fields nor an earlier attribute can be overwritten.
fn free_key(object: &Map<String, JsonValue>, key: &str) -> String {
    if !object.contains_key(key) {
        return key.to_string();
    }
    let renamed = format!("attr.{}", key);
    let mut candidate = renamed.clone();
    let mut n = 2;
    while object.contains_key(&candidate) {
        candidate = format!("{}#{}", renamed, n);
        n += 1;
    }
    candidate
}

#[async_trait]
impl LogSink for JsonFileSink {
    fn is_active(&self, level: Level) -> bool {
        level >= self.level
    }

    async fn handle(&self, mut record: LogRecord, _cancel: &CancellationToken) -> Result<(), SinkError> {
        self.scope.apply(&mut record);
        let line = Self::encode(&record)?;

        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        if let Some(tracker) = &self.line_tracker {
            tracker.advance();
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_tracker::AtomicLineTracker;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn writes_one_object_per_line_and_advances_tracker() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let tracker = Arc::new(AtomicLineTracker::new());
        let sink: Arc<dyn LogSink> = Arc::new(
            JsonFileSink::new(buf.clone(), Level::DEBUG).with_line_tracker(tracker.clone()),
        );
        let sink = sink.with_attrs(vec![Attribute::new("run_id", "r1")]);

        let cancel = CancellationToken::new();
        let first = LogRecord::new(Level::INFO, "start")
            .with_attr("elapsed", Duration::from_millis(2))
            .with_attr("cmd", vec![Attribute::new("name", "ls"), Attribute::new("exit_code", 0i64)]);
        sink.handle(first, &cancel).await.unwrap();
        sink.handle(LogRecord::new(Level::ERROR, "failed"), &cancel).await.unwrap();

        assert_eq!(tracker.current(), 2);

        let text = String::from_utf8(buf.lock().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: JsonValue = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["level"], "INFO");
        assert_eq!(first["msg"], "start");
        assert_eq!(first["elapsed"], 2_000_000);
        assert_eq!(first["cmd"]["name"], "ls");
        assert_eq!(first["run_id"], "r1");
        assert!(lines[0].starts_with("{\"time\":"));

        let second: JsonValue = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["level"], "ERROR");
    }

    #[tokio::test]
    async fn attrs_cannot_overwrite_header_or_each_other() {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = JsonFileSink::new(buf.clone(), Level::DEBUG);

        let record = LogRecord::new(Level::ERROR, "real failure")
            .with_attr("level", "DEBUG")
            .with_attr("msg", "all good")
            .with_attr("time", "yesterday")
            .with_attr("step", "a")
            .with_attr("step", "b")
            .with_attr("step", "c");
        sink.handle(record, &CancellationToken::new()).await.unwrap();

        let text = String::from_utf8(buf.lock().clone()).unwrap();
        let line: JsonValue = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["msg"], "real failure");
        assert_ne!(line["time"], "yesterday");
        assert_eq!(line["attr.level"], "DEBUG");
        assert_eq!(line["attr.msg"], "all good");
        assert_eq!(line["attr.time"], "yesterday");
        assert_eq!(line["step"], "a");
        assert_eq!(line["attr.step"], "b");
        assert_eq!(line["attr.step#2"], "c");
    }
}
