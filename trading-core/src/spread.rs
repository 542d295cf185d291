use crate::store::Snapshot;
use crate::types::{CanonicalSymbol, ExchangeId, MarketType, QuoteCell, TimestampMS};
use serde::{Deserialize, Serialize};

/// Default number of opportunities kept after ranking
pub const DEFAULT_SPREAD_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadKind {
    #[serde(rename = "spot-spot")]
    SpotSpot,
}

/// Buy on one exchange at its ask, sell on another at its bid.
///
/// Serialized with the field names dashboards already consume
/// (`buyFrom`, `sellTo`, `edgePct`, `ts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadOpportunity {
    pub symbol: CanonicalSymbol,
    #[serde(rename = "type")]
    pub kind: SpreadKind,
    #[serde(rename = "buyFrom")]
    pub buy_exchange: ExchangeId,
    #[serde(rename = "sellTo")]
    pub sell_exchange: ExchangeId,
    #[serde(rename = "buyAsk")]
    pub buy_ask: f64,
    #[serde(rename = "sellBid")]
    pub sell_bid: f64,
    /// `(sellBid - buyAsk) / buyAsk * 100`
    #[serde(rename = "edgePct")]
    pub edge_percent: f64,
    #[serde(rename = "ts")]
    pub computed_at: TimestampMS,
}

/// Ranks cross-exchange spot-spot edges from a snapshot.
///
/// Stateless: every call recomputes from the snapshot it is given.
#[derive(Debug, Clone, Copy)]
pub struct SpreadEngine {
    limit: usize,
}

impl Default for SpreadEngine {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SPREAD_LIMIT,
        }
    }
}

impl SpreadEngine {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Compute the top spot-spot opportunities.
    ///
    /// For every symbol with at least two spot exchanges, every ordered pair
    /// (buy, sell) with buy != sell is considered. Pairs with an unusable buy
    /// ask or sell bid are skipped and negative edges are dropped. Results are
    /// sorted by edge, largest first, and truncated to the engine limit.
    ///
    /// # Arguments
    /// * `snapshot` - Store snapshot to rank
    /// * `computed_at` - Timestamp stamped on every opportunity
    pub fn compute_spot_spreads(
        &self,
        snapshot: &Snapshot,
        computed_at: TimestampMS,
    ) -> Vec<SpreadOpportunity> {
        let mut results = Vec::new();

        for (symbol, markets) in snapshot.symbols() {
            let Some(spot) = markets.get(&MarketType::Spot) else {
                continue;
            };
            if spot.len() < 2 {
                continue;
            }

            for (buy_exchange, buy) in spot {
                let Some(buy_ask) = usable_ask(buy) else {
                    continue;
                };

                for (sell_exchange, sell) in spot {
                    if buy_exchange == sell_exchange {
                        continue;
                    }
                    let Some(sell_bid) = usable_bid(sell) else {
                        continue;
                    };

                    let edge_percent = (sell_bid - buy_ask) / buy_ask * 100.0;
                    if edge_percent < 0.0 {
                        continue;
                    }

                    results.push(SpreadOpportunity {
                        symbol: symbol.clone(),
                        kind: SpreadKind::SpotSpot,
                        buy_exchange: buy_exchange.clone(),
                        sell_exchange: sell_exchange.clone(),
                        buy_ask,
                        sell_bid,
                        edge_percent,
                        computed_at,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.edge_percent.total_cmp(&a.edge_percent));
        results.truncate(self.limit);
        results
    }
}

/// [`SpreadEngine::compute_spot_spreads`] with the default limit
pub fn compute_spot_spreads(snapshot: &Snapshot, computed_at: TimestampMS) -> Vec<SpreadOpportunity> {
    SpreadEngine::default().compute_spot_spreads(snapshot, computed_at)
}

fn usable_ask(cell: &QuoteCell) -> Option<f64> {
    (cell.ask.is_finite() && cell.ask > 0.0).then_some(cell.ask)
}

fn usable_bid(cell: &QuoteCell) -> Option<f64> {
    (cell.bid.is_finite() && cell.bid > 0.0).then_some(cell.bid)
}
