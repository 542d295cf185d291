use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{first_row, price_at, str_at, timestamp_at};

/// Tried in turn on every reconnect; the paper-trading host is the last resort
const ENDPOINTS: &[&str] = &[
    "wss://ws.okx.com:8443/ws/v5/public",
    "wss://wsaws.okx.com:8443/ws/v5/public",
    "wss://wspap.okx.com:8443/ws/v5/public?brokerId=9999",
];

pub const RECONNECT_DELAY: Duration = Duration::from_millis(1500);
pub const PING_INTERVAL: Duration = Duration::from_secs(10);

/// OKX v5 public `tickers` channel. Perpetuals are the `-SWAP` instruments.
pub struct OkxStream {
    market: MarketType,
}

impl OkxStream {
    pub fn spot() -> Self {
        Self {
            market: MarketType::Spot,
        }
    }

    pub fn futures() -> Self {
        Self {
            market: MarketType::Futures,
        }
    }
}

#[async_trait]
impl StreamAdapter for OkxStream {
    fn exchange(&self) -> &'static str {
        "okx"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        Some(match self.market {
            MarketType::Spot => symbol.to_string(),
            MarketType::Futures => format!("{}-SWAP", symbol),
        })
    }

    async fn endpoint(
        &self,
        attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(ENDPOINTS[attempt as usize % ENDPOINTS.len()].to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        let args: Vec<Value> = instruments
            .iter()
            .map(|inst| json!({"channel": "tickers", "instId": inst}))
            .collect();
        vec![json!({"op": "subscribe", "args": args}).to_string()]
    }

    fn ping_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn ping_message(&self, _now: TimestampMS) -> Option<String> {
        Some(json!({"op": "ping"}).to_string())
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        if text == "pong" {
            return Ok(None);
        }
        let msg = parse_json(text)?;
        if let Some(event) = msg.get("event").and_then(Value::as_str) {
            if event == "error" {
                let reason = str_at(&msg, &["msg"]).unwrap_or("unknown");
                return Err(DecodeError::Upstream(reason.to_string()));
            }
            return Ok(None);
        }
        if msg.get("op").and_then(Value::as_str) == Some("pong") {
            return Ok(None);
        }

        let Some(arg) = msg.get("arg") else {
            return Ok(None);
        };
        if arg.get("channel").and_then(Value::as_str) != Some("tickers") {
            return Ok(None);
        }
        let Some(row) = msg.get("data").and_then(first_row) else {
            return Ok(None);
        };

        let inst = str_at(arg, &["instId"])
            .or_else(|| str_at(row, &["instId"]))
            .ok_or(DecodeError::Missing("instId"))?;
        let bid = price_at(row, &["bidPx"]).ok_or(DecodeError::BadPrice("bidPx"))?;
        let ask = price_at(row, &["askPx"]).ok_or(DecodeError::BadPrice("askPx"))?;

        Ok(Some(
            RawQuote::new(inst, bid, ask).at(timestamp_at(row, &["ts"])),
        ))
    }
}
