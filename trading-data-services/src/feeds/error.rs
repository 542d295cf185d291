use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::feeds::http::FetchError;

/// Failures that end one connection or poll attempt.
///
/// None of these are fatal: the owning worker backs off and tries again.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("Closed by server: {0}")]
    Closed(String),

    #[error("Stream ended unexpectedly")]
    StreamEnded,

    #[error("Endpoint resolution failed: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl FeedError {
    /// Stable key for warn-once logging, free of server-supplied text
    pub fn condition(&self) -> String {
        match self {
            FeedError::Connect(_) => "connect".to_string(),
            FeedError::ConnectTimeout => "timeout".to_string(),
            FeedError::WebSocket(_) => "ws".to_string(),
            FeedError::Closed(_) => "closed".to_string(),
            FeedError::StreamEnded => "ended".to_string(),
            FeedError::Endpoint(_) => "endpoint".to_string(),
            FeedError::Fetch(e) => format!("fetch:{}", e.condition()),
        }
    }
}
