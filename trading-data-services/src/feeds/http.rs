use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Body(String),
}

/// How a failed request affects the symbol it was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network trouble, timeouts, throttling, server errors: retry next cycle
    Transient,
    /// The venue refused this instrument: stop asking
    Rejected,
}

impl FetchError {
    pub fn class(&self) -> FailureClass {
        match self {
            // 408 and 429 are the client-error codes that mean "try later"
            FetchError::Status(code) if (400..500).contains(code) && *code != 408 && *code != 429 => {
                FailureClass::Rejected
            }
            _ => FailureClass::Transient,
        }
    }

    /// Stable key for warn-once logging, free of per-response text
    pub fn condition(&self) -> String {
        match self {
            FetchError::Status(code) => format!("http-{}", code),
            FetchError::Timeout => "timeout".to_string(),
            FetchError::Transport(_) => "transport".to_string(),
            FetchError::Body(_) => "body".to_string(),
        }
    }
}

/// JSON-over-HTTP transport used by pollers and endpoint resolution.
///
/// Kept behind a trait so the poll harness can be driven by a scripted
/// fetcher in tests.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, FetchError>;
}

/// reqwest-backed fetcher with a per-request timeout
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("market-aggregator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<Value, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest)?;
        Self::read(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, FetchError> {
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(map_reqwest)?;
        Self::read(response).await
    }
}
