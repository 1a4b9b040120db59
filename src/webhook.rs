use crate::error::{BuildError, DeliveryError};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Per-request timeout of the default HTTP client.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// One JSON POST to a webhook endpoint.
///
/// The alert sink owns retry and backoff; a transport performs exactly one
/// request per call.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// **Returns**
    /// - `Ok(status)` for any HTTP response, successful or not.
    /// - `Err(DeliveryError::Transport)` if no response was received.
    async fn post_json(&self, url: &Url, body: &[u8]) -> Result<u16, DeliveryError>;
}

/// Accept only `https://` URLs with a host.
///
/// Error messages never echo the URL; webhook URLs embed their credential.
pub fn validate_webhook_url(raw: &str) -> Result<Url, BuildError> {
    if raw.trim().is_empty() {
        return Err(BuildError::InvalidWebhookUrl("empty URL".to_string()));
    }
    let url = Url::parse(raw)
        .map_err(|err| BuildError::InvalidWebhookUrl(format!("failed to parse URL: {}", err)))?;
    if url.scheme() != "https" {
        return Err(BuildError::InvalidWebhookUrl(format!(
            "URL must use https scheme, got: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(BuildError::InvalidWebhookUrl("URL must have a host".to_string()));
    }
    Ok(url)
}

/// `reqwest`-backed transport.
#[cfg(feature = "webhook")]
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "webhook")]
impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, BuildError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BuildError::HttpClient(err.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post_json(&self, url: &Url, body: &[u8]) -> Result<u16, DeliveryError> {
        let resp = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.without_url().to_string()))?;
        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_with_host() {
        let url = validate_webhook_url("https://hooks.example.com/services/T000/B000/XXX").unwrap();
        assert_eq!(url.host_str(), Some("hooks.example.com"));
    }

    #[test]
    fn rejects_empty_plain_http_and_garbage() {
        for raw in ["", "   ", "http://hooks.example.com/x", "not a url", "ftp://example.com"] {
            let err = validate_webhook_url(raw).unwrap_err();
            assert!(matches!(err, BuildError::InvalidWebhookUrl(_)), "{raw:?} accepted");
        }
    }

    #[test]
    fn error_text_does_not_leak_the_url() {
        let err = validate_webhook_url("http://hooks.example.com/services/SECRET").unwrap_err();
        assert!(!err.to_string().contains("SECRET"));
    }

    #[cfg(feature = "webhook")]
    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new(HTTP_TIMEOUT).is_ok());
    }
}
