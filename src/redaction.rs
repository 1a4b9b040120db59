use crate::error::{BuildError, SinkError};
use crate::record::{Attribute, Level, LogRecord, Value};
use crate::sink::LogSink;
use async_trait::async_trait;
use regex::{RegexSet, RegexSetBuilder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PLACEHOLDER: &str = "***";

/// Attribute keys with this prefix name environment variables.
pub const ENV_KEY_PREFIX: &str = "env_";

/// Credential-shaped names, matched case-insensitively against keys and
/// string values.
pub const DEFAULT_CREDENTIAL_PATTERNS: &[&str] = &[
    "(password|token|secret|key|api_key)",
    "aws_access_key_id",
    "aws_secret_access_key",
    "aws_session_token",
    "google_application_credentials",
    "gcp_service_account_key",
    "github_token",
    "gitlab_token",
    r"^(bearer|basic)\s+\S+",
    r"^authorization\s*[:=]",
];

/// Matched against keys only. As values they would hit ordinary prose.
pub const DEFAULT_KEY_PATTERNS: &[&str] = &["authorization", "^(bearer|basic)$"];

pub const DEFAULT_ALLOWED_ENV_KEYS: &[&str] = &[
    "PATH", "HOME", "USER", "LANG", "SHELL", "TERM", "PWD", "OLDPWD", "HOSTNAME", "LOGNAME",
    "TZ", "DISPLAY", "TMPDIR", "EDITOR", "PAGER",
];

fn compile(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<RegexSet, BuildError> {
    Ok(RegexSetBuilder::new(patterns).case_insensitive(true).build()?)
}

/// What to redact and what to replace it with.
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    allowed_env_keys: Vec<String>,
    patterns: RegexSet,
    key_patterns: RegexSet,
    placeholder: String,
}

impl RedactionConfig {
    /// Build a configuration from an allow-list and pattern sources. The
    /// patterns apply to both keys and string values.
    ///
    /// **Returns**
    /// - `Err(BuildError::InvalidPattern)` if any pattern fails to compile.
    pub fn new<I, P>(allowed_env_keys: I, patterns: &[P]) -> Result<Self, BuildError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: AsRef<str>,
    {
        Ok(Self {
            allowed_env_keys: allowed_env_keys.into_iter().map(Into::into).collect(),
            patterns: compile(patterns)?,
            key_patterns: RegexSet::empty(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        })
    }

    /// The built-in allow-list and patterns.
    pub fn standard() -> Result<Self, BuildError> {
        Self::new(DEFAULT_ALLOWED_ENV_KEYS.iter().copied(), DEFAULT_CREDENTIAL_PATTERNS)?
            .with_key_patterns(DEFAULT_KEY_PATTERNS)
    }

    /// Extra patterns checked against attribute keys but never values.
    pub fn with_key_patterns<P: AsRef<str>>(mut self, patterns: &[P]) -> Result<Self, BuildError> {
        self.key_patterns = compile(patterns)?;
        Ok(self)
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// True when a string value must be hidden.
    pub fn is_sensitive(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }

    pub fn is_sensitive_key(&self, key: &str) -> bool {
        self.patterns.is_match(key) || self.key_patterns.is_match(key)
    }

    pub fn is_allowed_env_key(&self, name: &str) -> bool {
        self.allowed_env_keys.iter().any(|allowed| allowed.eq_ignore_ascii_case(name))
    }

    /// Redact one attribute, descending into groups. Keys and nesting are kept.
    pub fn redact_attr(&self, attr: Attribute) -> Attribute {
        let Attribute { key, value } = attr;

        let hidden_env = key
            .strip_prefix(ENV_KEY_PREFIX)
            .map_or(false, |name| !self.is_allowed_env_key(name));
        if hidden_env || self.is_sensitive_key(&key) {
            return self.placeholder_for(key);
        }

        match value {
            Value::String(s) if self.is_sensitive(&s) => self.placeholder_for(key),
            Value::Group(attrs) => Attribute { key, value: Value::Group(self.redact_attrs(attrs)) },
            value => Attribute { key, value },
        }
    }

    pub fn redact_attrs(&self, attrs: Vec<Attribute>) -> Vec<Attribute> {
        attrs.into_iter().map(|attr| self.redact_attr(attr)).collect()
    }

    fn placeholder_for(&self, key: String) -> Attribute {
        Attribute { key, value: Value::String(self.placeholder.clone()) }
    }
}

/// Decorator that redacts every attribute before it reaches the inner sink.
pub struct RedactingSink {
    inner: Arc<dyn LogSink>,
    config: Arc<RedactionConfig>,
}

impl RedactingSink {
    pub fn new(inner: Arc<dyn LogSink>, config: RedactionConfig) -> Self {
        Self { inner, config: Arc::new(config) }
    }

    pub fn inner(&self) -> &Arc<dyn LogSink> {
        &self.inner
    }
}

#[async_trait]
impl LogSink for RedactingSink {
    fn is_active(&self, level: Level) -> bool {
        self.inner.is_active(level)
    }

    async fn handle(&self, mut record: LogRecord, cancel: &CancellationToken) -> Result<(), SinkError> {
        record.attrs = self.config.redact_attrs(std::mem::take(&mut record.attrs));
        self.inner.handle(record, cancel).await
    }

    fn with_attrs(self: Arc<Self>, attrs: Vec<Attribute>) -> Arc<dyn LogSink> {
        let redacted = self.config.redact_attrs(attrs);
        Arc::new(RedactingSink {
            inner: Arc::clone(&self.inner).with_attrs(redacted),
            config: Arc::clone(&self.config),
        })
    }

    fn with_scope(self: Arc<Self>, name: &str) -> Arc<dyn LogSink> {
        Arc::new(RedactingSink {
            inner: Arc::clone(&self.inner).with_scope(name),
            config: Arc::clone(&self.config),
        })
    }
}
