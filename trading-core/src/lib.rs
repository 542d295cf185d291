pub mod basis;
pub mod spread;
pub mod store;
pub mod symbol;
pub mod types;

// Re-export commonly used items
pub use basis::{compute_basis, BasisEntry};
pub use spread::{compute_spot_spreads, SpreadEngine, SpreadKind, SpreadOpportunity};
pub use store::{QuoteStore, Snapshot, UpsertOutcome, UpsertPolicy};
pub use symbol::{normalize, normalize_canonical};
pub use types::{
    now_ms, CanonicalSymbol, ExchangeId, MarketType, Quote, QuoteCell, QuoteUpdate, TimestampMS,
};
