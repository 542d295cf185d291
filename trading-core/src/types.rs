pub mod market;
pub mod quote;

// Re-export common types
pub use market::{CanonicalSymbol, MarketType, SymbolError};
pub use quote::{Quote, QuoteCell, QuoteError, QuoteUpdate};

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMS = u64;

/// Exchange identifier as stored in the snapshot (e.g., "binance", "kraken")
pub type ExchangeId = String;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> TimestampMS {
    chrono::Utc::now().timestamp_millis().max(0) as TimestampMS
}
