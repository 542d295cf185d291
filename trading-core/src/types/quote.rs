use crate::types::{CanonicalSymbol, ExchangeId, MarketType, SymbolError, TimestampMS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {side} price: {value}")]
    InvalidPrice { side: &'static str, value: f64 },

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// Best bid/ask observation for one (exchange, market type, symbol).
///
/// Prices are non-negative and finite. A crossed book (`bid > ask`) is kept
/// as reported. Values never change after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    exchange: ExchangeId,
    market_type: MarketType,
    symbol: CanonicalSymbol,
    bid: f64,
    ask: f64,
    observed_at: TimestampMS,
}

impl Quote {
    pub fn new(
        exchange: impl Into<ExchangeId>,
        market_type: MarketType,
        symbol: CanonicalSymbol,
        bid: f64,
        ask: f64,
        observed_at: TimestampMS,
    ) -> Result<Self, QuoteError> {
        let exchange = exchange.into();
        if exchange.trim().is_empty() {
            return Err(QuoteError::MissingField("exchange"));
        }
        check_price("bid", bid)?;
        check_price("ask", ask)?;

        Ok(Self {
            exchange,
            market_type,
            symbol,
            bid,
            ask,
            observed_at,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn market_type(&self) -> MarketType {
        self.market_type
    }

    pub fn symbol(&self) -> &CanonicalSymbol {
        &self.symbol
    }

    pub fn bid(&self) -> f64 {
        self.bid
    }

    pub fn ask(&self) -> f64 {
        self.ask
    }

    pub fn observed_at(&self) -> TimestampMS {
        self.observed_at
    }

    /// Snapshot cell view of this quote
    pub fn cell(&self) -> QuoteCell {
        QuoteCell {
            bid: self.bid,
            ask: self.ask,
            ts: self.observed_at,
        }
    }
}

fn check_price(side: &'static str, value: f64) -> Result<(), QuoteError> {
    // NaN fails both comparisons
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(QuoteError::InvalidPrice { side, value })
    }
}

/// One snapshot cell: `{ bid, ask, ts }`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteCell {
    pub bid: f64,
    pub ask: f64,
    pub ts: TimestampMS,
}

/// Loosely-typed upsert request as it arrives at the store boundary.
///
/// Every field is optional so that incomplete calls can be recognised and
/// discarded instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteUpdate {
    pub exchange: Option<String>,
    pub market_type: Option<MarketType>,
    pub symbol: Option<String>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    #[serde(alias = "ts")]
    pub timestamp: Option<TimestampMS>,
}

impl QuoteUpdate {
    /// Validate into a [`Quote`], stamping `received_at` when no timestamp was given
    pub fn into_quote(self, received_at: TimestampMS) -> Result<Quote, QuoteError> {
        let exchange = self
            .exchange
            .filter(|e| !e.trim().is_empty())
            .ok_or(QuoteError::MissingField("exchange"))?;
        let market_type = self.market_type.ok_or(QuoteError::MissingField("marketType"))?;
        let symbol = self
            .symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or(QuoteError::MissingField("symbol"))?;
        let symbol = CanonicalSymbol::parse(&symbol)?;
        let bid = self.bid.ok_or(QuoteError::MissingField("bid"))?;
        let ask = self.ask.ok_or(QuoteError::MissingField("ask"))?;

        Quote::new(
            exchange,
            market_type,
            symbol,
            bid,
            ask,
            self.timestamp.unwrap_or(received_at),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> CanonicalSymbol {
        CanonicalSymbol::parse("BTC-USDT").unwrap()
    }

    #[test]
    fn test_quote_accepts_crossed_book() {
        let quote = Quote::new("binance", MarketType::Spot, btc(), 101.0, 100.0, 1).unwrap();
        assert!(quote.bid() > quote.ask());
    }

    #[test]
    fn test_quote_rejects_negative_and_nan() {
        assert!(matches!(
            Quote::new("binance", MarketType::Spot, btc(), -1.0, 100.0, 1),
            Err(QuoteError::InvalidPrice { side: "bid", .. })
        ));
        assert!(Quote::new("binance", MarketType::Spot, btc(), 1.0, f64::NAN, 1).is_err());
        assert!(Quote::new("binance", MarketType::Spot, btc(), f64::INFINITY, 1.0, 1).is_err());
        assert!(Quote::new("", MarketType::Spot, btc(), 1.0, 1.0, 1).is_err());
    }

    #[test]
    fn test_update_requires_identity_fields() {
        let update = QuoteUpdate {
            exchange: Some("okx".to_string()),
            market_type: Some(MarketType::Spot),
            symbol: None,
            bid: Some(1.0),
            ask: Some(2.0),
            timestamp: None,
        };
        assert_eq!(
            update.into_quote(10).unwrap_err(),
            QuoteError::MissingField("symbol")
        );
    }

    #[test]
    fn test_update_from_json_uses_received_time() {
        let update: QuoteUpdate = serde_json::from_str(
            r#"{"exchange":"bybit","marketType":"futures","symbol":"ETH-USDT","bid":10.5,"ask":10.6}"#,
        )
        .unwrap();
        let quote = update.into_quote(42).unwrap();
        assert_eq!(quote.market_type(), MarketType::Futures);
        assert_eq!(quote.observed_at(), 42);
        assert_eq!(quote.cell(), QuoteCell { bid: 10.5, ask: 10.6, ts: 42 });
    }
}
