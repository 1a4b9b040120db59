use thiserror::Error;

/// Errors raised while assembling sinks. These are fatal at startup.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{sink}: writer is required")]
    WriterRequired { sink: &'static str },

    #[error("{sink}: capabilities are required")]
    CapabilitiesRequired { sink: &'static str },

    #[error("{sink}: formatter is required")]
    FormatterRequired { sink: &'static str },

    #[error("{sink}: line tracker is required")]
    LineTrackerRequired { sink: &'static str },

    #[error("{sink}: inner sink is required")]
    InnerSinkRequired { sink: &'static str },

    #[error("invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    #[error("invalid redaction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to open log file: {0}")]
    LogFile(#[from] std::io::Error),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Outcome of a failed webhook delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Non-success status other than 429 or 5xx. Never retried.
    #[error("webhook client error: status {0}")]
    Client(u16),

    /// 429 or 5xx. Retried with backoff.
    #[error("webhook server error: status {0}")]
    Server(u16),

    /// Connection, TLS or timeout failure. Retried with backoff.
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("failed to deliver alert after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<DeliveryError> },

    #[error("failed to serialize alert message: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Server(_) | DeliveryError::Transport(_))
    }

    /// Number of attempts made, when the error is the result of exhausting retries.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            DeliveryError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Error returned from [`LogSink::handle`](crate::sink::LogSink::handle).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The caller's cancellation token fired while the sink was waiting.
    #[error("log delivery cancelled")]
    Cancelled,

    #[error("{} sinks failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<SinkError>),
}

impl SinkError {
    /// Combine child failures; `None` when the list is empty. Failures that
    /// are all cancellations collapse to a single [`SinkError::Cancelled`].
    pub fn combine(mut errors: Vec<SinkError>) -> Option<SinkError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ if errors.iter().all(|err| matches!(err, SinkError::Cancelled)) => Some(SinkError::Cancelled),
            _ => Some(SinkError::Multiple(errors)),
        }
    }

    /// True if this failure, or any failure combined into it, was a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            SinkError::Cancelled => true,
            SinkError::Multiple(errors) => errors.iter().any(SinkError::is_cancelled),
            _ => false,
        }
    }
}

fn join_errors(errors: &[SinkError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}
