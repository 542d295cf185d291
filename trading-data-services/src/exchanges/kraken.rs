use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::symbol::override_instruments;
use trading_core::{CanonicalSymbol, MarketType};

use crate::feeds::adapter::{parse_json, DecodeError, PollAdapter, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{price, price_at, str_at};

const TICKER_URL: &str = "https://api.kraken.com/0/public/Ticker";
const FUTURES_WS: &str = "wss://futures.kraken.com/ws/v1";

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(9);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Kraken lists bitcoin under its legacy ticker
fn alt_base(base: &str) -> &str {
    match base {
        "BTC" => "XBT",
        other => other,
    }
}

/// Kraken spot REST ticker.
///
/// Only `-USDT` pairs are polled. Each one tries the USDT listing first and
/// the USD listing second; either answer is stored under the tracked symbol.
pub struct KrakenSpotPoller;

impl PollAdapter for KrakenSpotPoller {
    fn exchange(&self) -> &'static str {
        "kraken"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Spot
    }

    fn symbol_urls(&self, symbol: &CanonicalSymbol) -> Vec<String> {
        if symbol.quote() != "USDT" {
            return Vec::new();
        }
        let alt = alt_base(symbol.base());
        vec![
            format!("{}?pair={}USDT", TICKER_URL, alt),
            format!("{}?pair={}USD", TICKER_URL, alt),
        ]
    }

    fn decode_symbol(
        &self,
        _symbol: &CanonicalSymbol,
        body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError> {
        let errors: Vec<&str> = body
            .get("error")
            .and_then(Value::as_array)
            .map(|errs| errs.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(first) = errors.first() {
            let message = errors.join(", ");
            return Err(if first.contains("Unknown asset pair") {
                DecodeError::Rejected(message)
            } else {
                DecodeError::Upstream(message)
            });
        }

        // Result is keyed by Kraken's internal pair name (e.g. "XXBTZUSD")
        let Some((name, ticker)) = body
            .get("result")
            .and_then(Value::as_object)
            .and_then(|result| result.iter().next())
        else {
            return Ok(None);
        };

        // `b` and `a` are [price, whole lot volume, lot volume]
        let bid = ticker
            .get("b")
            .and_then(|b| b.get(0))
            .and_then(price)
            .ok_or(DecodeError::BadPrice("b"))?;
        let ask = ticker
            .get("a")
            .and_then(|a| a.get(0))
            .and_then(price)
            .ok_or(DecodeError::BadPrice("a"))?;

        Ok(Some(RawQuote::new(name.as_str(), bid, ask)))
    }
}

/// Kraken Futures `ticker_lite` feed for the inverse perpetuals
pub struct KrakenFuturesStream;

#[async_trait]
impl StreamAdapter for KrakenFuturesStream {
    fn exchange(&self) -> &'static str {
        "kraken"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Futures
    }

    /// Only the perpetuals in the override table are listed; a tracked
    /// `BTC-USDT` subscribes to the USD-margined `PI_XBTUSD`
    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        let usd = CanonicalSymbol::from_parts(symbol.base(), "USD").ok()?;
        override_instruments(self.exchange(), &usd)
            .into_iter()
            .find(|raw| raw.starts_with("PI_"))
            .map(str::to_string)
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        _http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        Ok(FUTURES_WS.to_string())
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        vec![json!({
            "event": "subscribe",
            "feed": "ticker_lite",
            "product_ids": instruments,
        })
        .to_string()]
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        let feed = msg.get("feed").and_then(Value::as_str);
        if !matches!(feed, Some("ticker") | Some("ticker_lite")) || msg.get("event").is_some() {
            // info, heartbeat and subscription acks
            return Ok(None);
        }

        let product = str_at(&msg, &["product_id"]).ok_or(DecodeError::Missing("product_id"))?;
        let bid = price_at(&msg, &["bid"]).ok_or(DecodeError::BadPrice("bid"))?;
        let ask = price_at(&msg, &["ask"]).ok_or(DecodeError::BadPrice("ask"))?;

        Ok(Some(RawQuote::new(product, bid, ask)))
    }
}
