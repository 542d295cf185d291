use crate::types::{
    now_ms, CanonicalSymbol, ExchangeId, MarketType, Quote, QuoteCell, QuoteUpdate,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// `exchange -> cell` for one (symbol, market type)
pub type ExchangeQuotes = BTreeMap<ExchangeId, QuoteCell>;

/// `market type -> exchange -> cell` for one symbol
pub type MarketQuotes = BTreeMap<MarketType, ExchangeQuotes>;

type Cells = BTreeMap<CanonicalSymbol, MarketQuotes>;

/// How an upsert resolves against the cell it would replace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertPolicy {
    /// Arrival order wins, even when the exchange timestamp is older
    #[default]
    LastReceived,
    /// Updates older than the stored `observed_at` are ignored
    LastTimestamped,
}

impl fmt::Display for UpsertPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertPolicy::LastReceived => f.write_str("last-received"),
            UpsertPolicy::LastTimestamped => f.write_str("last-timestamped"),
        }
    }
}

impl FromStr for UpsertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-received" => Ok(UpsertPolicy::LastReceived),
            "last-timestamped" => Ok(UpsertPolicy::LastTimestamped),
            other => Err(format!("unknown upsert policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Dropped by [`UpsertPolicy::LastTimestamped`]
    Stale,
}

/// Point-in-time deep copy of the store: `symbol -> market type -> exchange -> { bid, ask, ts }`.
///
/// Owned by the caller; later upserts never show through.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(Cells);

impl Snapshot {
    pub fn get(&self, symbol: &str, market: MarketType, exchange: &str) -> Option<&QuoteCell> {
        self.0.get(symbol)?.get(&market)?.get(exchange)
    }

    /// Every market and exchange quoting `symbol`
    pub fn markets(&self, symbol: &str) -> Option<&MarketQuotes> {
        self.0.get(symbol)
    }

    /// All exchanges quoting `symbol` on `market`
    pub fn exchanges(&self, symbol: &str, market: MarketType) -> Option<&ExchangeQuotes> {
        self.0.get(symbol)?.get(&market)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&CanonicalSymbol, &MarketQuotes)> {
        self.0.iter()
    }

    /// Number of populated cells
    pub fn len(&self) -> usize {
        self.0
            .values()
            .flat_map(|markets| markets.values())
            .map(|exchanges| exchanges.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory latest-quote table shared by every feed and reader.
///
/// Writers and readers take a short lock; `snapshot()` copies under the read
/// lock and returns. Consistency is per cell only: a snapshot may mix a fresh
/// quote for one exchange with an older one for another.
#[derive(Debug, Default)]
pub struct QuoteStore {
    cells: RwLock<Cells>,
    policy: UpsertPolicy,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: UpsertPolicy) -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> UpsertPolicy {
        self.policy
    }

    /// Insert or replace the (symbol, market type, exchange) cell
    pub fn upsert(&self, quote: Quote) -> UpsertOutcome {
        let cell = quote.cell();
        let mut cells = self.cells.write();
        let exchanges = cells
            .entry(quote.symbol().clone())
            .or_default()
            .entry(quote.market_type())
            .or_default();

        match exchanges.get_mut(quote.exchange()) {
            Some(existing) => {
                if self.policy == UpsertPolicy::LastTimestamped && cell.ts < existing.ts {
                    return UpsertOutcome::Stale;
                }
                *existing = cell;
                UpsertOutcome::Replaced
            }
            None => {
                exchanges.insert(quote.exchange().to_string(), cell);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Boundary form of [`upsert`](Self::upsert): incomplete or invalid
    /// updates are discarded without touching the table.
    ///
    /// # Returns
    /// `true` if the update reached the table
    pub fn upsert_update(&self, update: QuoteUpdate) -> bool {
        match update.into_quote(now_ms()) {
            Ok(quote) => self.upsert(quote) != UpsertOutcome::Stale,
            Err(e) => {
                tracing::trace!("Discarding quote update: {}", e);
                false
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.cells.read().clone())
    }

    pub fn len(&self) -> usize {
        self.cells
            .read()
            .values()
            .flat_map(|markets| markets.values())
            .map(|exchanges| exchanges.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }
}
