use crate::alert_message::{build_message, AlertContext, AlertMessage, MessageType};
use crate::backoff::BackoffPolicy;
use crate::env::local_hostname;
use crate::error::{BuildError, DeliveryError, SinkError};
use crate::record::{Attribute, Level, LogRecord, Value};
use crate::schema;
use crate::scope::ScopeState;
use crate::sink::LogSink;
use crate::webhook::{validate_webhook_url, WebhookTransport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Sends records flagged with `slack_notify = true` to a chat webhook.
///
/// The record's `message_type` picks the message layout. Delivery is retried
/// on 429, 5xx and transport failures according to the [`BackoffPolicy`];
/// any other non-2xx status fails immediately.
#[derive(Clone)]
pub struct AlertSink {
    url: Arc<Url>,
    run_id: Arc<str>,
    hostname: Arc<str>,
    transport: Arc<dyn WebhookTransport>,
    backoff: BackoffPolicy,
    level: Level,
    scope: ScopeState,
}

impl AlertSink {
    /// Sink backed by [`ReqwestTransport`](crate::webhook::ReqwestTransport).
    ///
    /// **Returns**
    /// - `Err(BuildError::InvalidWebhookUrl)` unless `webhook_url` is `https://` with a host.
    #[cfg(feature = "webhook")]
    pub fn new(webhook_url: &str, run_id: &str, backoff: BackoffPolicy) -> Result<Self, BuildError> {
        let url = validate_webhook_url(webhook_url)?;
        let transport = crate::webhook::ReqwestTransport::new(crate::webhook::HTTP_TIMEOUT)?;
        Ok(Self::from_parts(url, run_id, backoff, Arc::new(transport)))
    }

    /// Sink with a caller-supplied transport.
    pub fn with_transport(
        webhook_url: &str,
        run_id: &str,
        backoff: BackoffPolicy,
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self, BuildError> {
        let url = validate_webhook_url(webhook_url)?;
        Ok(Self::from_parts(url, run_id, backoff, transport))
    }

    fn from_parts(url: Url, run_id: &str, backoff: BackoffPolicy, transport: Arc<dyn WebhookTransport>) -> Self {
        debug!(
            run_id,
            backoff_base_ms = backoff.base.as_millis() as u64,
            retry_count = backoff.retry_count,
            "created webhook alert sink"
        );
        Self {
            url: Arc::new(url),
            run_id: Arc::from(run_id),
            hostname: Arc::from(local_hostname()),
            transport,
            backoff,
            level: Level::INFO,
            scope: ScopeState::default(),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Layout for `record`, or `None` when it is not flagged for delivery.
    pub fn message_for(&self, record: &LogRecord) -> Option<AlertMessage> {
        let notify = record
            .find_scoped(schema::NOTIFY)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !notify {
            return None;
        }
        let kind = record
            .find_scoped(schema::MESSAGE_TYPE)
            .and_then(Value::as_str)
            .map_or(MessageType::Generic, MessageType::parse);
        let ctx = AlertContext { run_id: &self.run_id, hostname: &self.hostname };
        Some(build_message(kind, record, ctx))
    }

    /// POST `message`, retrying per the backoff policy.
    ///
    /// **Returns**
    /// - `Err(SinkError::Cancelled)` as soon as `cancel` fires, whether waiting
    ///   for a response or for the next retry.
    /// - `Err(DeliveryError::Client)` after the first non-retryable status.
    /// - `Err(DeliveryError::Exhausted)` once every attempt has failed.
    pub async fn deliver(&self, message: &AlertMessage, cancel: &CancellationToken) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(message).map_err(|err| {
            error!(error = %err, run_id = %self.run_id, "failed to serialize webhook alert");
            DeliveryError::Serialize(err)
        })?;
        debug!(run_id = %self.run_id, message_text = %message.text, "sending webhook alert");

        let attempts = self.backoff.max_attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let wait = self.backoff.interval(attempt - 1);
                debug!(
                    attempt,
                    backoff_ms = wait.as_millis() as u64,
                    run_id = %self.run_id,
                    "retrying webhook alert"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SinkError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SinkError::Cancelled),
                outcome = self.transport.post_json(&self.url, &payload) => outcome,
            };

            let failure = match outcome {
                Ok(status) if (200..300).contains(&status) => {
                    info!(status, run_id = %self.run_id, "webhook alert delivered");
                    return Ok(());
                }
                Ok(status) if status == 429 || status >= 500 => DeliveryError::Server(status),
                Ok(status) => {
                    error!(status, run_id = %self.run_id, "webhook rejected alert");
                    return Err(DeliveryError::Client(status).into());
                }
                Err(err) if !err.is_retryable() => return Err(err.into()),
                Err(err) => err,
            };

            warn!(attempt, error = %failure, run_id = %self.run_id, "webhook alert attempt failed");
            last_error = Some(failure);
        }

        let last = last_error.unwrap_or_else(|| DeliveryError::Transport("no attempt made".to_string()));
        error!(attempts, last_error = %last, run_id = %self.run_id, "giving up on webhook alert");
        Err(DeliveryError::Exhausted { attempts, last: Box::new(last) }.into())
    }
}

#[async_trait]
impl LogSink for AlertSink {
    fn is_active(&self, level: Level) -> bool {
        level >= self.level
    }

    async fn handle(&self, mut record: LogRecord, cancel: &CancellationToken) -> Result<(), SinkError> {
        self.scope.apply(&mut record);
        match self.message_for(&record) {
            Some(message) => self.deliver(&message, cancel).await,
            None => Ok(()),
        }
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
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    const URL: &str = "https://hooks.example.com/services/T/B/X";

    /// Replays scripted responses; repeats the last one when the script runs out.
    struct Scripted {
        responses: Mutex<VecDeque<Result<u16, DeliveryError>>>,
        calls: Mutex<Vec<(Instant, serde_json::Value)>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<u16, DeliveryError>>) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses.into()), calls: Mutex::new(Vec::new()) })
        }

        fn always(status: u16) -> Arc<Self> {
            Self::new(vec![Ok(status)])
        }

        fn calls(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl WebhookTransport for Scripted {
        async fn post_json(&self, _url: &Url, body: &[u8]) -> Result<u16, DeliveryError> {
            let body = serde_json::from_slice(body).unwrap();
            self.calls.lock().push((Instant::now(), body));
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                match responses.front().unwrap() {
                    Ok(status) => Ok(*status),
                    Err(err) => Err(DeliveryError::Transport(err.to_string())),
                }
            }
        }
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl WebhookTransport for Hanging {
        async fn post_json(&self, _url: &Url, _body: &[u8]) -> Result<u16, DeliveryError> {
            std::future::pending().await
        }
    }

    fn sink(transport: Arc<dyn WebhookTransport>) -> Arc<dyn LogSink> {
        Arc::new(AlertSink::with_transport(URL, "run-7", BackoffPolicy::default(), transport).unwrap())
    }

    fn notify(message_type: &str) -> LogRecord {
        LogRecord::new(Level::ERROR, "alert")
            .with_attr("slack_notify", true)
            .with_attr("message_type", message_type)
    }

    #[test]
    fn construction_rejects_insecure_urls() {
        let transport = Scripted::always(200);
        let err = AlertSink::with_transport("http://hooks.example.com/x", "r", BackoffPolicy::default(), transport)
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::InvalidWebhookUrl(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_server_errors_exhaust_after_four_attempts() {
        let transport = Scripted::always(500);
        let sink = sink(transport.clone());
        let started = Instant::now();

        let err = sink.handle(notify("security_alert"), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(transport.calls(), 4);
        match err {
            SinkError::Delivery(delivery) => {
                assert_eq!(delivery.attempts(), Some(4));
                assert!(delivery.to_string().contains("status 500"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let offsets: Vec<Duration> = transport.calls.lock().iter().map(|(at, _)| *at - started).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(6),
                Duration::from_secs(14)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let transport = Scripted::always(404);
        let err = sink(transport.clone())
            .handle(notify("pre_execution_error"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, SinkError::Delivery(DeliveryError::Client(404))));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_and_transport_errors_are_retried() {
        let transport = Scripted::new(vec![
            Ok(429),
            Err(DeliveryError::Transport("connection reset".into())),
            Ok(204),
        ]);
        sink(transport.clone())
            .handle(notify("security_alert"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let transport = Scripted::always(503);
        let sink = sink(transport.clone());
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task = tokio::spawn(async move { sink.handle(notify("security_alert"), &token).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_hanging_request() {
        let sink = sink(Arc::new(Hanging));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { sink.handle(notify("generic"), &token).await });
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn records_without_the_flag_are_ignored() {
        let transport = Scripted::always(200);
        let sink = sink(transport.clone());
        let cancel = CancellationToken::new();

        sink.handle(LogRecord::new(Level::ERROR, "plain"), &cancel).await.unwrap();
        let off = LogRecord::new(Level::ERROR, "off").with_attr("slack_notify", false);
        sink.handle(off, &cancel).await.unwrap();
        let wrong_type = LogRecord::new(Level::ERROR, "str").with_attr("slack_notify", "true");
        sink.handle(wrong_type, &cancel).await.unwrap();

        assert_eq!(transport.calls(), 0);
        assert!(!sink.is_active(Level::DEBUG));
        assert!(sink.is_active(Level::INFO));
    }

    #[tokio::test]
    async fn scoped_sink_still_finds_the_trigger_and_sends_generic_text() {
        let transport = Scripted::always(200);
        let sink = sink(transport.clone()).with_scope("runner");

        sink.handle(notify("unheard_of"), &CancellationToken::new()).await.unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, serde_json::json!({"text": "ERROR: alert (Run ID: run-7)"}));
    }
}
