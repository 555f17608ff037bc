//! Blocking HTTP GET seam shared by the remote clients.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failed GET. `retryable` marks connection failures, timeouts, 429 and 5xx.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
    pub retryable: bool,
}

pub trait HttpGet {
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

pub struct BlockingHttp {
    client: reqwest::blocking::Client,
}

impl BlockingHttp {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError {
                message: format!("failed to build http client: {}", e),
                retryable: false,
            })?;
        Ok(Self { client })
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl HttpGet for BlockingHttp {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().map_err(|e| FetchError {
            message: e.to_string(),
            retryable: true,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError {
                message: format!("HTTP {}", status),
                retryable: retryable_status(status),
            });
        }
        response.text().map_err(|e| FetchError {
            message: e.to_string(),
            retryable: true,
        })
    }
}
