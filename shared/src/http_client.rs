//! Outbound GET primitive used by the upstream clients.
//!
//! The transport retries connection failures and 5xx responses with a short exponential
//! backoff and gives up with `HttpError::RetriesExceeded`. Rate limiting (429) is returned
//! to the caller untouched.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("invalid http client configuration: {0}")]
    Build(reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream unavailable after {retries} retries (last status {status})")]
    RetriesExceeded { status: StatusCode, retries: u32 },
}

impl HttpError {
    /// True when the failure message itself signals throttling.
    pub fn is_rate_limited(&self) -> bool {
        self.to_string().to_lowercase().contains("too many")
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, HttpError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    config: TransportConfig,
}

impl ReqwestClient {
    pub fn new(config: TransportConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(HttpError::Build)?;

        Ok(ReqwestClient { client, config })
    }

    fn retry_delay(&self, retries: u32) -> Duration {
        let delay = self
            .config
            .backoff_initial
            .saturating_mul(2_u32.saturating_pow(retries));
        delay.min(self.config.backoff_max)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, HttpError> {
        let mut retries = 0;

        loop {
            let result = self.client.get(url).headers(headers.clone()).send().await;

            let retriable = match &result {
                Ok(response) => RETRIABLE_STATUS_CODES.contains(&response.status()),
                Err(e) => e.is_connect() || e.is_timeout(),
            };

            if retriable && retries < self.config.max_retries {
                let delay = self.retry_delay(retries);
                tracing::debug!(
                    url,
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                sleep(delay).await;
                retries += 1;
                continue;
            }

            let response = result?;
            let status = response.status();
            if retriable {
                return Err(HttpError::RetriesExceeded { status, retries });
            }
            let body = response.bytes().await?.to_vec();
            return Ok(HttpResponse { status, body });
        }
    }
}
