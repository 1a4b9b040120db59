//! Redacting structured-log router.
//!
//! Records flow through a [`RedactingSink`](redaction::RedactingSink) into a
//! [`FanOutSink`](fanout::FanOutSink) whose children write a JSON log file,
//! an interactive console, plain text for redirected output, and chat-webhook
//! alerts. [`init::build_pipeline`] wires the standard arrangement.

pub mod record;
pub mod error;
pub mod sink;
pub mod scope;
pub mod line_tracker;
pub mod capabilities;
pub mod formatter;
pub mod redaction;
pub mod text;
pub mod json;
pub mod conditional;
pub mod interactive;
pub mod backoff;
pub mod webhook;
pub mod schema;
pub mod alert_message;
pub mod alert;
pub mod fanout;
pub mod noop_sink;
pub mod logger;
pub mod pre_exec;
pub mod env;
pub mod layer;
pub mod init;

pub use error::{BuildError, DeliveryError, SinkError};
pub use init::{build_pipeline, install_tracing_bridge, Pipeline, PipelineConfig, PipelineWriters};
pub use logger::Logger;
pub use record::{Attribute, Level, LogRecord, Value};
pub use sink::{shared_writer, LogSink, SharedWriter};
