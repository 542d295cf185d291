use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{price_at, str_at};

const WS_FEED: &str = "wss://ws-feed.exchange.coinbase.com";

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Coinbase Exchange `ticker` channel.
///
/// Products are USD-quoted: a tracked `BTC-USDT` subscribes to `BTC-USD` and
/// its quotes are stored under `BTC-USD`.
pub struct CoinbaseStream;

/// RFC 3339 `time` field in milliseconds
fn parse_time(raw: &str) -> Option<TimestampMS> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    u64::try_from(parsed.timestamp_millis()).ok()
}

#[async_trait]
impl StreamAdapter for CoinbaseStream {
    fn exchange(&self) -> &'static str {
        "coinbase"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Spot
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        Some(format!("{}-USD", symbol.base()))
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(WS_FEED.to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        vec![json!({
            "type": "subscribe",
            "channels": [{"name": "ticker", "product_ids": instruments}],
        })
        .to_string()]
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        match msg.get("type").and_then(Value::as_str) {
            Some("ticker") => {}
            Some("error") => {
                let reason = str_at(&msg, &["reason", "message"]).unwrap_or("unknown");
                return Err(DecodeError::Upstream(reason.to_string()));
            }
            _ => return Ok(None),
        }

        let product = str_at(&msg, &["product_id"]).ok_or(DecodeError::Missing("product_id"))?;
        let bid = price_at(&msg, &["best_bid", "bid"]).ok_or(DecodeError::BadPrice("best_bid"))?;
        let ask = price_at(&msg, &["best_ask", "ask"]).ok_or(DecodeError::BadPrice("best_ask"))?;
        let ts = str_at(&msg, &["time"]).and_then(parse_time);

        Ok(Some(RawQuote::new(product, bid, ask).at(ts)))
    }
}
