use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{first_row, price_at, str_at, timestamp_at};

const WS_PUBLIC: &str = "wss://ws.bitget.com/v2/ws/public";

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Bitget v2 public `ticker` channel
pub struct BitgetStream {
    market: MarketType,
}

impl BitgetStream {
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

    fn inst_type(&self) -> &'static str {
        match self.market {
            MarketType::Spot => "SPOT",
            MarketType::Futures => "USDT-FUTURES",
        }
    }
}

#[async_trait]
impl StreamAdapter for BitgetStream {
    fn exchange(&self) -> &'static str {
        "bitget"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        Some(format!("{}{}", symbol.base(), symbol.quote()))
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(WS_PUBLIC.to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        let args: Vec<Value> = instruments
            .iter()
            .map(|inst| json!({"instType": self.inst_type(), "channel": "ticker", "instId": inst}))
            .collect();
        vec![json!({"op": "subscribe", "args": args}).to_string()]
    }

    fn ping_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn ping_message(&self, _now: TimestampMS) -> Option<String> {
        Some("ping".to_string())
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

        let Some(arg) = msg.get("arg") else {
            return Ok(None);
        };
        if arg.get("channel").and_then(Value::as_str) != Some("ticker") {
            return Ok(None);
        }
        let row = msg
            .get("data")
            .and_then(first_row)
            .ok_or(DecodeError::Missing("data"))?;

        let inst = str_at(arg, &["instId"])
            .or_else(|| str_at(row, &["instId", "symbol"]))
            .ok_or(DecodeError::Missing("instId"))?;
        let bid = price_at(row, &["bidPr"]).ok_or(DecodeError::BadPrice("bidPr"))?;
        let ask = price_at(row, &["askPr"]).ok_or(DecodeError::BadPrice("askPr"))?;

        Ok(Some(
            RawQuote::new(inst, bid, ask).at(timestamp_at(row, &["ts"])),
        ))
    }
}
