pub mod adapter;
pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod dedup_log;
pub mod error;
pub mod http;
pub mod json;
pub mod poll_worker;
pub mod stream_worker;
pub mod supervisor;

// Re-export commonly used items
pub use adapter::{DecodeError, FeedAdapter, FeedId, FeedSpec, PollAdapter, RawQuote, StreamAdapter};
pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
pub use circuit_breaker::CircuitBreaker;
pub use config::{FeedName, FeedSettings, FeedsConfig, DEFAULT_TRACKED_SYMBOLS};
pub use dedup_log::DedupLog;
pub use error::FeedError;
pub use http::{FailureClass, FetchError, HttpFetcher, ReqwestFetcher};
pub use poll_worker::{CycleReport, PollWorker};
pub use stream_worker::StreamWorker;
pub use supervisor::{FeedBoard, FeedState, FeedStatus, FeedSupervisor};
