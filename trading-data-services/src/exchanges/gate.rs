use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{first_row, price_pair, str_at, timestamp_at};

const SPOT_WS: &str = "wss://api.gateio.ws/ws/v4/";
const FUTURES_WS: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";

pub const SPOT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const FUTURES_RECONNECT_DELAY: Duration = Duration::from_millis(1500);
pub const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Field names differ between `book_ticker` and `tickers` and across API versions
const PRICE_KEYS: &[(&str, &str)] = &[
    ("b", "a"),
    ("best_bid", "best_ask"),
    ("highest_bid", "lowest_ask"),
    ("bid", "ask"),
    ("bestBid", "bestAsk"),
];

/// Gate.io v4 websocket. Futures subscribe to both `book_ticker` and
/// `tickers` since some regions only push on the latter.
pub struct GateStream {
    market: MarketType,
}

impl GateStream {
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

    fn prefix(&self) -> &'static str {
        match self.market {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }

    fn channels(&self) -> &'static [&'static str] {
        match self.market {
            MarketType::Spot => &["spot.book_ticker"],
            MarketType::Futures => &["futures.book_ticker", "futures.tickers"],
        }
    }
}

fn unix_seconds(now: TimestampMS) -> u64 {
    now / 1000
}

#[async_trait]
impl StreamAdapter for GateStream {
    fn exchange(&self) -> &'static str {
        "gate"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        if self.market == MarketType::Futures && symbol.quote() != "USDT" {
            // The endpoint is scoped to USDT-settled contracts
            return None;
        }
        Some(format!("{}_{}", symbol.base(), symbol.quote()))
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(match self.market {
            MarketType::Spot => SPOT_WS,
            MarketType::Futures => FUTURES_WS,
        }
        .to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        let time = unix_seconds(trading_core::now_ms());
        self.channels()
            .iter()
            .map(|channel| {
                json!({
                    "time": time,
                    "channel": channel,
                    "event": "subscribe",
                    "payload": instruments,
                })
                .to_string()
            })
            .collect()
    }

    fn ping_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn ping_message(&self, now: TimestampMS) -> Option<String> {
        Some(
            json!({
                "time": unix_seconds(now),
                "channel": format!("{}.ping", self.prefix()),
            })
            .to_string(),
        )
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        let channel = msg.get("channel").and_then(Value::as_str).unwrap_or_default();
        if !self.channels().contains(&channel) {
            return Ok(None);
        }
        if msg.get("event").and_then(Value::as_str) != Some("update") {
            // subscribe acks carry {"status":"success"}
            return Ok(None);
        }
        if let Some(err) = msg.get("error").filter(|e| !e.is_null()) {
            return Err(DecodeError::Upstream(err.to_string()));
        }

        let row = msg
            .get("result")
            .and_then(first_row)
            .ok_or(DecodeError::Missing("result"))?;
        let symbol = str_at(row, &["s", "contract", "currency_pair", "symbol"])
            .ok_or(DecodeError::Missing("s"))?;
        let (bid, ask) = price_pair(row, PRICE_KEYS).ok_or(DecodeError::BadPrice("b"))?;

        Ok(Some(
            RawQuote::new(symbol, bid, ask).at(timestamp_at(row, &["t"])),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_spot_book_ticker() {
        let text = r#"{"time":1730540000,"time_ms":1730540000123,"channel":"spot.book_ticker","event":"update","result":{"t":1730540000120,"u":48733182,"s":"BTC_USDT","b":"62000.1","B":"0.1","a":"62000.2","A":"0.3"}}"#;
        let quote = GateStream::spot().decode(text).unwrap().unwrap();
        assert_eq!(quote.symbol, "BTC_USDT");
        assert_eq!(quote.ask, 62000.2);
        assert_eq!(quote.exchange_ts, Some(1730540000120));
    }

    #[test]
    fn test_decode_futures_tickers_array() {
        let text = r#"{"time":1,"channel":"futures.tickers","event":"update","result":[{"contract":"ETH_USDT","last":"2500","highest_bid":"2499.9","lowest_ask":"2500.1"}]}"#;
        let quote = GateStream::futures().decode(text).unwrap().unwrap();
        assert_eq!(quote.symbol, "ETH_USDT");
        assert_eq!(quote.bid, 2499.9);
    }

    #[test]
    fn test_decode_ignores_acks_and_pongs() {
        let adapter = GateStream::futures();
        let ack = r#"{"time":1,"channel":"futures.book_ticker","event":"subscribe","result":{"status":"success"}}"#;
        assert_eq!(adapter.decode(ack).unwrap(), None);
        let pong = r#"{"time":1,"channel":"futures.pong","event":"","result":null}"#;
        assert_eq!(adapter.decode(pong).unwrap(), None);
    }

    #[test]
    fn test_decode_update_without_prices() {
        let text = r#"{"channel":"futures.tickers","event":"update","result":[{"contract":"BTC_USDT","last":"62000"}]}"#;
        assert_eq!(
            GateStream::futures().decode(text),
            Err(DecodeError::BadPrice("b"))
        );
    }

    #[test]
    fn test_subscribe_and_ping() {
        let instruments = vec!["BTC_USDT".to_string()];
        assert_eq!(GateStream::spot().subscribe_messages(&instruments).len(), 1);
        let futures = GateStream::futures().subscribe_messages(&instruments);
        assert_eq!(futures.len(), 2);
        assert!(futures[1].contains("futures.tickers"));

        let ping = GateStream::spot().ping_message(1730540000123).unwrap();
        assert!(ping.contains(r#""channel":"spot.ping""#));
        assert!(ping.contains("1730540000"));
    }

    #[test]
    fn test_futures_skip_non_usdt() {
        let symbol = CanonicalSymbol::parse("BTC-USD").unwrap();
        assert_eq!(GateStream::futures().instrument(&symbol), None);
        assert_eq!(GateStream::spot().instrument(&symbol).unwrap(), "BTC_USD");
    }
}
