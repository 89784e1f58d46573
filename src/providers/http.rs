use crate::core::{ScrapeError, config::HttpConfig};
use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, warn};

const LEGACY_RENEGOTIATION_SIGNATURE: &str = "unsafe legacy renegotiation disabled";

/// HTTP transport shared by all providers.
///
/// Retries retryable statuses and transient connection errors with exponential backoff
/// (`backoff * 2^attempt`). A handshake rejected for unsafe legacy renegotiation is not
/// retried: the TLS backend offers no switch to allow it.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retries: u32,
    backoff_secs: f64,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            retries: config.retries,
            backoff_secs: config.retry_backoff_secs.max(0.0),
        })
    }

    /// Sends a request and returns the body decoded as (lossy) UTF-8.
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        body: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            debug!(
                "[http] {} {} attempt {}/{}",
                method,
                url,
                attempt + 1,
                self.retries + 1
            );
            let mut request = self.client.request(method.clone(), url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(body) = body {
                request = request.body(body.to_string());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.map_err(|e| ScrapeError::Transport {
                            url: url.to_string(),
                            message: error_chain(&e),
                        })?;
                        return Ok(String::from_utf8_lossy(&bytes).into_owned());
                    }
                    debug!("[http] HTTP {} for {}", status, url);
                    if ScrapeError::is_retryable_status(status.as_u16()) && attempt < self.retries
                    {
                        self.sleep_backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ScrapeError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    }
                    .into());
                }
                Err(err) => {
                    let message = error_chain(&err);
                    let legacy = requires_legacy_renegotiation(&message);
                    if legacy {
                        warn!("[http] {} requires unsafe legacy TLS renegotiation", url);
                    }
                    debug!("[http] request error for {}: {}", url, message);
                    if !legacy && is_transient(&err) && attempt < self.retries {
                        self.sleep_backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ScrapeError::Transport {
                        url: url.to_string(),
                        message,
                    }
                    .into());
                }
            }
        }
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.fetch(url, Method::GET, None, &[]).await
    }

    /// Like [`HttpClient::fetch`], decoding the body as JSON.
    pub async fn fetch_json(
        &self,
        url: &str,
        method: Method,
        body: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let text = self.fetch(url, method, body, headers).await?;
        serde_json::from_str(&text).map_err(|e| {
            ScrapeError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// POSTs `payload` as JSON and decodes a JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let body = serde_json::to_string(payload)?;
        let mut all_headers = vec![("Content-Type", "application/json")];
        all_headers.extend(
            headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type")),
        );
        if let Some(content_type) = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            all_headers[0] = *content_type;
        }
        self.fetch_json(url, Method::POST, Some(&body), &all_headers)
            .await
    }

    async fn sleep_backoff(&self, attempt: u32) {
        tokio::time::sleep(backoff_delay(self.backoff_secs, attempt)).await;
    }
}

/// `backoff * 2^attempt` seconds, saturating instead of overflowing.
fn backoff_delay(backoff_secs: f64, attempt: u32) -> Duration {
    let delay = (backoff_secs * 2f64.powi(attempt.min(i32::MAX as u32) as i32)).max(0.0);
    Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX)
}

/// OpenSSL reports the reason as `unsafe legacy renegotiation disabled`; other layers print the
/// `UNSAFE_LEGACY_RENEGOTIATION_DISABLED` code instead.
fn requires_legacy_renegotiation(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .replace('_', " ")
        .contains(LEGACY_RENEGOTIATION_SIGNATURE)
}

fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs));

    if config.ssl_no_verify {
        builder = builder.danger_accept_invalid_certs(true);
    } else if let Some(bundle) = &config.ca_bundle {
        let pem = std::fs::read(bundle)
            .with_context(|| format!("Failed to read CA bundle: {}", bundle.display()))?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem)
            .with_context(|| format!("Invalid CA bundle: {}", bundle.display()))?;
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder.build().context("Failed to build HTTP client")
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(retries: u32) -> HttpClient {
        let config = HttpConfig {
            retries,
            retry_backoff_secs: 0.0,
            ..HttpConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_retries_retryable_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&mock_server)
            .await;

        let client = test_client(3);
        let body = client
            .get_text(&format!("{}/flaky", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = test_client(2);
        let err = client.get_text(&mock_server.uri()).await.unwrap_err();
        match err.downcast_ref::<ScrapeError>() {
            Some(ScrapeError::HttpStatus { status, .. }) => assert_eq!(*status, 502),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(3);
        assert!(client.get_text(&mock_server.uri()).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_error_is_transport() {
        let client = test_client(1);
        // nothing listens on port 9 locally
        let err = client.get_text("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Transport { .. })
        ));
    }

    #[test]
    fn test_legacy_renegotiation_signature() {
        let openssl = "error trying to connect: error:0A000152:SSL routines:\
            final_renegotiate:unsafe legacy renegotiation disabled:ssl/statem/extensions.c:922:";
        assert!(requires_legacy_renegotiation(openssl));
        assert!(requires_legacy_renegotiation(
            "[SSL: UNSAFE_LEGACY_RENEGOTIATION_DISABLED] handshake failure"
        ));
        assert!(!requires_legacy_renegotiation("error trying to connect: tcp connect error"));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(0.5, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(0.0, 5), Duration::ZERO);
        assert_eq!(backoff_delay(f64::INFINITY, 0), Duration::MAX);
        assert_eq!(backoff_delay(1e300, 10), Duration::MAX);
    }

    #[tokio::test]
    async fn test_fetch_json_decode_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&mock_server)
            .await;

        let client = test_client(0);
        let err = client
            .fetch_json(&mock_server.uri(), Method::GET, None, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Decode { .. })
        ));
        assert!(err.to_string().starts_with("JSON decode failed for"));
    }

    #[tokio::test]
    async fn test_post_json_sends_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("content-type", "application/json"))
            .and(header("signature", "abc"))
            .and(body_string(r#"{"code":"产品"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&mock_server)
            .await;

        let client = test_client(0);
        let value = client
            .post_json(
                &format!("{}/api", mock_server.uri()),
                &serde_json::json!({"code": "产品"}),
                &[("signature", "abc")],
            )
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_lossy_utf8_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'o', 0xff, b'k']))
            .mount(&mock_server)
            .await;

        let client = test_client(0);
        let body = client.get_text(&mock_server.uri()).await.unwrap();
        assert_eq!(body, "o\u{fffd}k");
    }
}
