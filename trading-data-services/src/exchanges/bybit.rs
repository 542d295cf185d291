use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, PollAdapter, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{first_row, price_at, str_at, timestamp_at};

const SPOT_WS: &str = "wss://stream.bybit.com/v5/public/spot";
const LINEAR_WS: &str = "wss://stream.bybit.com/v5/public/linear";
const TICKERS_URL: &str = "https://api.bybit.com/v5/market/tickers";

/// Spot accepts at most 10 topics per subscribe request
const ARGS_PER_SUBSCRIBE: usize = 10;

/// `retCode` for symbols the venue does not list
const RET_NOT_SUPPORTED: i64 = 10001;

pub const RECONNECT_DELAY: Duration = Duration::from_millis(1500);
pub const PING_INTERVAL: Duration = Duration::from_secs(10);
pub const SPOT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const FUTURES_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const FUTURES_POLITENESS: Duration = Duration::from_millis(120);

const BID_KEYS: &[&str] = &["bid1Price", "bestBidPrice", "bidPrice"];
const ASK_KEYS: &[&str] = &["ask1Price", "bestAskPrice", "askPrice"];

fn pair(symbol: &CanonicalSymbol) -> String {
    format!("{}{}", symbol.base(), symbol.quote())
}

/// Bybit v5 public websocket: `bookticker.*` on spot, `tickers.*` on linear
pub struct BybitStream {
    market: MarketType,
}

impl BybitStream {
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

    fn topic(&self) -> &'static str {
        match self.market {
            MarketType::Spot => "bookticker",
            MarketType::Futures => "tickers",
        }
    }
}

#[async_trait]
impl StreamAdapter for BybitStream {
    fn exchange(&self) -> &'static str {
        "bybit"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        Some(pair(symbol))
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(match self.market {
            MarketType::Spot => SPOT_WS,
            MarketType::Futures => LINEAR_WS,
        }
        .to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        instruments
            .chunks(ARGS_PER_SUBSCRIBE)
            .map(|chunk| {
                let args: Vec<String> = chunk
                    .iter()
                    .map(|i| format!("{}.{}", self.topic(), i))
                    .collect();
                json!({"op": "subscribe", "args": args}).to_string()
            })
            .collect()
    }

    fn ping_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn ping_message(&self, _now: TimestampMS) -> Option<String> {
        Some(json!({"op": "ping"}).to_string())
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        if msg.get("op").is_some() || msg.get("success").is_some() {
            // pong and subscribe acks
            return Ok(None);
        }

        let Some(topic) = msg.get("topic").and_then(Value::as_str) else {
            return Ok(None);
        };
        if !topic.starts_with("bookticker.") && !topic.starts_with("tickers.") {
            return Ok(None);
        }

        let data = msg
            .get("data")
            .and_then(first_row)
            .ok_or(DecodeError::Missing("data"))?;
        let symbol = str_at(data, &["symbol", "s"])
            .or_else(|| topic.split_once('.').map(|(_, s)| s))
            .ok_or(DecodeError::Missing("symbol"))?;

        let (bid, ask) = match (price_at(data, BID_KEYS), price_at(data, ASK_KEYS)) {
            (Some(bid), Some(ask)) => (bid, ask),
            // Ticker deltas only carry the fields that changed
            _ if msg.get("type").and_then(Value::as_str) == Some("delta") => return Ok(None),
            (None, _) => return Err(DecodeError::BadPrice("bid1Price")),
            (_, None) => return Err(DecodeError::BadPrice("ask1Price")),
        };

        Ok(Some(
            RawQuote::new(symbol, bid, ask).at(timestamp_at(&msg, &["ts"])),
        ))
    }
}

/// Bybit v5 REST tickers, one request per symbol
pub struct BybitTickerPoller {
    market: MarketType,
}

impl BybitTickerPoller {
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

    fn category(&self) -> &'static str {
        match self.market {
            MarketType::Spot => "spot",
            MarketType::Futures => "linear",
        }
    }
}

impl PollAdapter for BybitTickerPoller {
    fn exchange(&self) -> &'static str {
        "bybit"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn symbol_urls(&self, symbol: &CanonicalSymbol) -> Vec<String> {
        vec![format!(
            "{}?category={}&symbol={}",
            TICKERS_URL,
            self.category(),
            pair(symbol)
        )]
    }

    fn decode_symbol(
        &self,
        _symbol: &CanonicalSymbol,
        body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError> {
        let code = body.get("retCode").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let message = str_at(body, &["retMsg"]).unwrap_or("unknown").to_string();
            return Err(if code == RET_NOT_SUPPORTED {
                DecodeError::Rejected(message)
            } else {
                DecodeError::Upstream(format!("retCode {}: {}", code, message))
            });
        }

        let Some(row) = body
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(first_row)
        else {
            return Ok(None);
        };

        let symbol = str_at(row, &["symbol"]).ok_or(DecodeError::Missing("symbol"))?;
        let bid = price_at(row, BID_KEYS).ok_or(DecodeError::BadPrice("bid1Price"))?;
        let ask = price_at(row, ASK_KEYS).ok_or(DecodeError::BadPrice("ask1Price"))?;

        Ok(Some(
            RawQuote::new(symbol, bid, ask).at(timestamp_at(body, &["time"])),
        ))
    }
}
