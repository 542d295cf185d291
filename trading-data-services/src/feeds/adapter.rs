use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::config::{FeedName, FeedSettings};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;

/// One worker's identity: the feed it belongs to and its connection shard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedId {
    pub name: FeedName,
    pub shard: usize,
}

impl FeedId {
    pub fn new(name: FeedName, shard: usize) -> Self {
        Self { name, shard }
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shard == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}#{}", self.name, self.shard)
        }
    }
}

/// Best bid/ask as decoded from a venue payload, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    /// Exchange-native instrument name
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Event time when the payload carries one
    pub exchange_ts: Option<TimestampMS>,
}

impl RawQuote {
    pub fn new(symbol: impl Into<String>, bid: f64, ask: f64) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            ask,
            exchange_ts: None,
        }
    }

    pub fn at(mut self, ts: Option<TimestampMS>) -> Self {
        self.exchange_ts = ts;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Payload is not JSON: {0}")]
    NotJson(String),

    #[error("Missing field `{0}`")]
    Missing(&'static str),

    #[error("Unparsable price in `{0}`")]
    BadPrice(&'static str),

    /// The venue answered but does not know the instrument
    #[error("Instrument rejected: {0}")]
    Rejected(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl DecodeError {
    /// Stable key for warn-once logging, free of per-message data
    pub fn condition(&self) -> String {
        match self {
            DecodeError::NotJson(_) => "not-json".to_string(),
            DecodeError::Missing(field) => format!("missing:{}", field),
            DecodeError::BadPrice(field) => format!("bad-price:{}", field),
            DecodeError::Rejected(_) => "rejected".to_string(),
            DecodeError::Upstream(_) => "upstream".to_string(),
        }
    }
}

pub fn parse_json(text: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError::NotJson(e.to_string()))
}

/// Push-based venue: one long-lived websocket per shard.
///
/// Everything venue-specific lives here; connection management, heartbeats
/// and reconnects are handled by the stream worker.
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// Exchange key used in the store (e.g., "binance")
    fn exchange(&self) -> &'static str;

    fn market_type(&self) -> MarketType;

    /// Upper bound on instruments per connection; `None` means one connection
    fn max_instruments_per_connection(&self) -> Option<usize> {
        None
    }

    /// Native instrument for a tracked symbol, `None` if the venue does not list it
    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String>;

    /// Websocket URL for this connection attempt.
    ///
    /// # Arguments
    /// * `attempt` - Zero-based reconnect counter, used for endpoint failover
    /// * `instruments` - Instruments this shard carries
    /// * `http` - Transport for venues that hand out tokenised endpoints
    async fn endpoint(
        &self,
        attempt: u32,
        instruments: &[String],
        http: &dyn HttpFetcher,
    ) -> Result<String, FeedError>;

    /// Frames sent right after connecting
    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String>;

    /// Application-level heartbeat period, if the venue needs one
    fn ping_interval(&self) -> Option<Duration> {
        None
    }

    fn ping_message(&self, _now: TimestampMS) -> Option<String> {
        None
    }

    /// Decode one text frame.
    ///
    /// # Returns
    /// `Ok(None)` for control frames (acks, pongs, heartbeats)
    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError>;
}

/// Pull-based venue polled over REST.
///
/// A cycle tries the batch request first when the venue has one; the
/// per-symbol requests are the fallback.
pub trait PollAdapter: Send + Sync {
    fn exchange(&self) -> &'static str;

    fn market_type(&self) -> MarketType;

    /// One request returning every instrument
    fn batch_url(&self) -> Option<String> {
        None
    }

    fn decode_batch(&self, _body: &Value) -> Result<Vec<RawQuote>, DecodeError> {
        Ok(Vec::new())
    }

    /// Candidate URLs for one symbol, tried in order. Empty when the venue
    /// has no per-symbol route for it.
    fn symbol_urls(&self, symbol: &CanonicalSymbol) -> Vec<String>;

    /// Decode a per-symbol response. The quote is attributed to `symbol`
    /// regardless of the instrument name in the payload.
    fn decode_symbol(
        &self,
        symbol: &CanonicalSymbol,
        body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError>;
}

#[derive(Clone)]
pub enum FeedAdapter {
    Stream(Arc<dyn StreamAdapter>),
    Poll(Arc<dyn PollAdapter>),
}

impl FeedAdapter {
    pub fn exchange(&self) -> &'static str {
        match self {
            FeedAdapter::Stream(adapter) => adapter.exchange(),
            FeedAdapter::Poll(adapter) => adapter.exchange(),
        }
    }

    pub fn market_type(&self) -> MarketType {
        match self {
            FeedAdapter::Stream(adapter) => adapter.market_type(),
            FeedAdapter::Poll(adapter) => adapter.market_type(),
        }
    }
}

/// A configured integration ready to be spawned by the supervisor
#[derive(Clone)]
pub struct FeedSpec {
    pub name: FeedName,
    pub adapter: FeedAdapter,
    pub settings: FeedSettings,
}
