use crate::error::SinkError;
use crate::record::{Attribute, Level, LogRecord, Value};
use crate::scope::ScopeState;
use crate::sink::{LogSink, SharedWriter};
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Plain `key=value` line sink for redirected output and pipes.
///
/// Output looks like
/// `time=2024-05-01T12:30:00.000Z level=INFO msg="group done" group=build`.
#[derive(Clone)]
pub struct TextSink {
    writer: SharedWriter,
    level: Level,
    scope: ScopeState,
}

impl TextSink {
    pub fn new(writer: SharedWriter, level: Level) -> Self {
        Self { writer, level, scope: ScopeState::default() }
    }

    fn render(&self, record: &LogRecord) -> String {
        let mut line = format!(
            "time={} level={} msg={}",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level,
            quote(&record.message)
        );
        for attr in &record.attrs {
            push_flattened(&mut line, "", attr);
        }
        line.push('\n');
        line
    }
}

fn push_flattened(line: &mut String, prefix: &str, attr: &Attribute) {
    let key = if prefix.is_empty() { attr.key.clone() } else { format!("{}.{}", prefix, attr.key) };
    match &attr.value {
        Value::Group(attrs) => {
            for inner in attrs {
                push_flattened(line, &key, inner);
            }
        }
        value => {
            line.push(' ');
            line.push_str(&quote(&key));
            line.push('=');
            line.push_str(&quote(&value.to_string()));
        }
    }
}

fn quote(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.chars().any(|c| c.is_whitespace() || c == '=' || c == '"' || c.is_control());
    if needs_quotes {
        format!("{:?}", text)
    } else {
        text.to_string()
    }
}

#[async_trait]
impl LogSink for TextSink {
    fn is_active(&self, level: Level) -> bool {
        level >= self.level
    }

    async fn handle(&self, mut record: LogRecord, _cancel: &CancellationToken) -> Result<(), SinkError> {
        self.scope.apply(&mut record);
        let line = self.render(&record);
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
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
