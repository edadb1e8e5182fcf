//! HTTP transport with automatic retries.

use crate::config::RetryConfig;
use crate::error::{Cancelled, RetryableError};
use crate::executor::{RetryEngine, RetryResult};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

impl From<reqwest::Error> for RetryableError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RetryableError::new(crate::ErrorCategory::Timeout, err.to_string())
        } else if err.is_connect() || err.is_request() {
            RetryableError::network(err.to_string())
        } else if let Some(status) = err.status() {
            RetryableError::http(status.as_u16(), err.to_string())
        } else {
            RetryableError::new(crate::ErrorCategory::Unknown, err.to_string())
        }
    }
}

/// HTTP client that runs every request through a [`RetryEngine`].
#[derive(Debug, Clone)]
pub struct RetryClient {
    client: Client,
    engine: RetryEngine,
    config: RetryConfig,
}

impl RetryClient {
    /// Create a client with its own engine.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_engine(Client::new(), RetryEngine::new(), config)
    }

    /// Create a client sharing an existing engine.
    pub fn with_engine(client: Client, engine: RetryEngine, config: RetryConfig) -> Self {
        Self {
            client,
            engine,
            config,
        }
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &RetryEngine {
        &self.engine
    }

    /// Get a reference to the retry config.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a GET request with retries.
    pub async fn get(
        &self,
        operation_id: &str,
        url: &str,
    ) -> Result<RetryResult<Response>, Cancelled> {
        self.request(operation_id, Method::GET, url, Option::<()>::None)
            .await
    }

    /// Execute a POST request with a JSON body, with retries.
    pub async fn post<B: Serialize>(
        &self,
        operation_id: &str,
        url: &str,
        body: &B,
    ) -> Result<RetryResult<Response>, Cancelled> {
        self.request(operation_id, Method::POST, url, Some(body))
            .await
    }

    /// Execute a request with retries, keyed on `operation_id` for circuit breaking.
    pub async fn request<B: Serialize>(
        &self,
        operation_id: &str,
        method: Method,
        url: &str,
        body: Option<B>,
    ) -> Result<RetryResult<Response>, Cancelled> {
        self.engine
            .retry(&self.config, Some(operation_id), || {
                let method = method.clone();
                let body = body.as_ref();

                async move {
                    debug!(method = %method, url, operation_id, "Making HTTP request");

                    let mut request = self.client.request(method, url);
                    if let Some(b) = body {
                        request = request.json(b);
                    }

                    let response = request.send().await.map_err(RetryableError::from)?;
                    check_response(response).await
                }
            })
            .await
    }
}

/// Check an HTTP response and convert to RetryableError if needed.
async fn check_response(response: Response) -> Result<Response, RetryableError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    let mut err = RetryableError::http(status.as_u16(), body);
    if let Some(delay) = retry_after {
        err = err.with_suggested_delay(delay);
    }
    Err(err)
}

/// Parse Retry-After header.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_secs)
}

fn parse_retry_after_secs(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
