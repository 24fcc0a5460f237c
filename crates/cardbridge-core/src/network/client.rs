//! Thin reqwest wrapper with status mapping.
//!
//! Every non-success response becomes a typed [`BridgeError`]: 429 maps to
//! `RateLimited` (honoring `Retry-After`), 404 to `NotFound`, anything else
//! to `Api` with a trimmed response body.

use crate::config::NetworkConfig;
use crate::error::{BridgeError, Result};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Longest response body kept in an `Api` error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client used by both remote collaborators.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| BridgeError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self { client, timeout })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a prepared request and map the status.
    pub async fn execute(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout(self.timeout)
            } else {
                BridgeError::Network {
                    message: format!("Request to {} failed: {}", url, e),
                    cause: std::error::Error::source(&e).map(|s| s.to_string()),
                }
            }
        })?;

        debug!("{} -> {}", url, response.status());
        check_response_status(response, url).await
    }
}

async fn check_response_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        return Err(BridgeError::RateLimited {
            service: extract_domain(url),
            retry_after_secs: retry_after,
        });
    }

    if status == StatusCode::NOT_FOUND {
        return Err(BridgeError::NotFound {
            what: url.to_string(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::Api {
        status: status.as_u16(),
        message: truncate(&body, MAX_ERROR_BODY),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
