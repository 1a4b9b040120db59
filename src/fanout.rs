use crate::error::SinkError;
use crate::record::{Attribute, Level, LogRecord};
use crate::sink::LogSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Delivers each record to every active child, in order.
///
/// A failing child does not stop the others; all failures come back
/// together via [`SinkError::combine`].
#[derive(Clone, Default)]
pub struct FanOutSink {
    children: Vec<Arc<dyn LogSink>>,
}

impl FanOutSink {
    pub fn new(children: Vec<Arc<dyn LogSink>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl LogSink for FanOutSink {
    fn is_active(&self, level: Level) -> bool {
        self.children.iter().any(|child| child.is_active(level))
    }

    async fn handle(&self, record: LogRecord, cancel: &CancellationToken) -> Result<(), SinkError> {
        let mut errors = Vec::new();
        for child in &self.children {
            if !child.is_active(record.level) {
                continue;
            }
            if let Err(err) = child.handle(record.clone(), cancel).await {
                errors.push(err);
            }
        }
        match SinkError::combine(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn with_attrs(self: Arc<Self>, attrs: Vec<Attribute>) -> Arc<dyn LogSink> {
        Arc::new(Self {
            children: self
                .children
                .iter()
                .map(|child| Arc::clone(child).with_attrs(attrs.clone()))
                .collect(),
        })
    }

    fn with_scope(self: Arc<Self>, name: &str) -> Arc<dyn LogSink> {
        Arc::new(Self {
            children: self
                .children
                .iter()
                .map(|child| Arc::clone(child).with_scope(name))
                .collect(),
        })
    }
}
