use serde_json::Value;
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType};

use crate::feeds::adapter::{DecodeError, PollAdapter, RawQuote};
use crate::feeds::json::{first_row, price_at, str_at, timestamp_at};

const SPOT_BOOK_TICKER: &str = "https://api.mexc.com/api/v3/ticker/bookTicker";
const CONTRACT_TICKER: &str = "https://contract.mexc.com/api/v1/contract/ticker";

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const FUTURES_POLITENESS: Duration = Duration::from_millis(80);

const FUTURES_BID_KEYS: &[&str] = &["bid1", "bestBid", "bidPrice"];
const FUTURES_ASK_KEYS: &[&str] = &["ask1", "bestAsk", "askPrice"];

/// MEXC spot: one batch request covering every listed pair.
///
/// Per-symbol requests answer 400 for many pairs, so there is no fallback.
pub struct MexcSpotPoller;

impl PollAdapter for MexcSpotPoller {
    fn exchange(&self) -> &'static str {
        "mexc"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Spot
    }

    fn batch_url(&self) -> Option<String> {
        Some(SPOT_BOOK_TICKER.to_string())
    }

    fn decode_batch(&self, body: &Value) -> Result<Vec<RawQuote>, DecodeError> {
        let rows = body.as_array().ok_or(DecodeError::Missing("rows"))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let symbol = str_at(row, &["symbol"])?;
                let bid = price_at(row, &["bidPrice"])?;
                let ask = price_at(row, &["askPrice"])?;
                Some(RawQuote::new(symbol, bid, ask))
            })
            .collect())
    }

    fn symbol_urls(&self, _symbol: &CanonicalSymbol) -> Vec<String> {
        Vec::new()
    }

    fn decode_symbol(
        &self,
        _symbol: &CanonicalSymbol,
        _body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError> {
        Ok(None)
    }
}

/// MEXC USDT-M perpetuals over the contract API: `symbol=all` batch, then a
/// polite per-symbol loop when the batch is unavailable
pub struct MexcFuturesPoller;

fn futures_row(row: &Value) -> Option<RawQuote> {
    let symbol = str_at(row, &["symbol"])?;
    let bid = price_at(row, FUTURES_BID_KEYS)?;
    let ask = price_at(row, FUTURES_ASK_KEYS)?;
    Some(RawQuote::new(symbol, bid, ask).at(timestamp_at(row, &["timestamp"])))
}

impl PollAdapter for MexcFuturesPoller {
    fn exchange(&self) -> &'static str {
        "mexc"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Futures
    }

    fn batch_url(&self) -> Option<String> {
        Some(format!("{}?symbol=all", CONTRACT_TICKER))
    }

    fn decode_batch(&self, body: &Value) -> Result<Vec<RawQuote>, DecodeError> {
        let rows = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or(DecodeError::Missing("data"))?;
        Ok(rows.iter().filter_map(futures_row).collect())
    }

    fn symbol_urls(&self, symbol: &CanonicalSymbol) -> Vec<String> {
        vec![format!(
            "{}?symbol={}_{}",
            CONTRACT_TICKER,
            symbol.base(),
            symbol.quote()
        )]
    }

    fn decode_symbol(
        &self,
        _symbol: &CanonicalSymbol,
        body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError> {
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = str_at(body, &["message", "msg"]).unwrap_or("success=false");
            return Err(DecodeError::Rejected(message.to_string()));
        }

        let Some(row) = body.get("data").and_then(first_row) else {
            return Ok(None);
        };
        let bid = price_at(row, FUTURES_BID_KEYS).ok_or(DecodeError::BadPrice("bid1"))?;
        let ask = price_at(row, FUTURES_ASK_KEYS).ok_or(DecodeError::BadPrice("ask1"))?;
        let symbol = str_at(row, &["symbol"]).unwrap_or_default();

        Ok(Some(
            RawQuote::new(symbol, bid, ask).at(timestamp_at(row, &["timestamp"])),
        ))
    }
}
