use async_trait::async_trait;
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{price_at, str_at, timestamp_at};

const SPOT_WS: &str = "wss://stream.binance.com:9443/stream";
const FUTURES_WS: &str = "wss://fstream.binance.com/stream";

/// Combined-stream URLs get unwieldy past this many streams
const STREAMS_PER_CONNECTION: usize = 60;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Binance `@bookTicker` combined streams, spot or USDT-M futures
pub struct BinanceStream {
    market: MarketType,
}

impl BinanceStream {
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
impl StreamAdapter for BinanceStream {
    fn exchange(&self) -> &'static str {
        "binance"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn max_instruments_per_connection(&self) -> Option<usize> {
        Some(STREAMS_PER_CONNECTION)
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        Some(format!("{}{}", symbol.base(), symbol.quote()).to_lowercase())
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        let base = match self.market {
            MarketType::Spot => SPOT_WS,
            MarketType::Futures => FUTURES_WS,
        };
        let streams: Vec<String> = instruments
            .iter()
            .map(|i| format!("{}@bookTicker", i))
            .collect();
        Ok(format!("{}?streams={}", base, streams.join("/")))
    }

    fn subscribe_messages(&self, _instruments: &[String]) -> Vec<String> {
        // Streams are selected in the URL
        Vec::new()
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        if msg.get("result").is_some() && msg.get("id").is_some() {
            return Ok(None);
        }

        let data = msg.get("data").unwrap_or(&msg);
        let symbol = str_at(data, &["s", "symbol"]).ok_or(DecodeError::Missing("s"))?;
        let bid = price_at(data, &["b"]).ok_or(DecodeError::BadPrice("b"))?;
        let ask = price_at(data, &["a"]).ok_or(DecodeError::BadPrice("a"))?;

        Ok(Some(
            RawQuote::new(symbol, bid, ask).at(timestamp_at(data, &["E", "T"])),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_spot_book_ticker() {
        let text = r#"{"stream":"btcusdt@bookTicker","data":{"u":400900217,"s":"BTCUSDT","b":"62000.10","B":"31.2","a":"62000.20","A":"40.6"}}"#;
        let quote = BinanceStream::spot().decode(text).unwrap().unwrap();
        assert_eq!(quote.symbol, "BTCUSDT");
        assert_eq!(quote.bid, 62000.10);
        assert_eq!(quote.ask, 62000.20);
        assert_eq!(quote.exchange_ts, None);
    }

    #[test]
    fn test_decode_futures_carries_event_time() {
        let text = r#"{"stream":"ethusdt@bookTicker","data":{"e":"bookTicker","u":1,"E":1730540000123,"T":1730540000120,"s":"ETHUSDT","b":"2500.1","B":"1","a":"2500.2","A":"2"}}"#;
        let quote = BinanceStream::futures().decode(text).unwrap().unwrap();
        assert_eq!(quote.exchange_ts, Some(1730540000123));
    }

    #[test]
    fn test_decode_control_and_malformed() {
        let adapter = BinanceStream::spot();
        assert_eq!(adapter.decode(r#"{"result":null,"id":1}"#).unwrap(), None);
        assert_eq!(
            adapter.decode(r#"{"data":{"s":"BTCUSDT","b":"x","a":"1"}}"#),
            Err(DecodeError::BadPrice("b"))
        );
        assert!(matches!(adapter.decode("not json"), Err(DecodeError::NotJson(_))));
    }

    #[test]
    fn test_instrument_and_sharding() {
        let adapter = BinanceStream::spot();
        let symbol = CanonicalSymbol::parse("BTC-USDT").unwrap();
        assert_eq!(adapter.instrument(&symbol).unwrap(), "btcusdt");
        assert_eq!(adapter.max_instruments_per_connection(), Some(60));
    }
}
