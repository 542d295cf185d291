use crate::store::Snapshot;
use crate::types::{CanonicalSymbol, ExchangeId, MarketType, QuoteCell, TimestampMS};
use serde::Serialize;

/// Spot vs perpetual premium on a single exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasisEntry {
    pub symbol: CanonicalSymbol,
    pub exchange: ExchangeId,
    pub spot_mid: f64,
    pub perp_mid: f64,
    /// `(perpMid - spotMid) / spotMid * 100`
    pub basis_pct: f64,
    /// Newer of the two legs
    pub ts: TimestampMS,
}

/// Mid price tolerant of one-sided books
pub fn safe_mid(cell: &QuoteCell) -> Option<f64> {
    let bid = (cell.bid.is_finite() && cell.bid > 0.0).then_some(cell.bid);
    let ask = (cell.ask.is_finite() && cell.ask > 0.0).then_some(cell.ask);
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

/// Basis for every (symbol, exchange) quoting both spot and futures,
/// largest absolute premium first
pub fn compute_basis(snapshot: &Snapshot) -> Vec<BasisEntry> {
    let mut entries = Vec::new();

    for (symbol, markets) in snapshot.symbols() {
        let (Some(spot), Some(perp)) = (
            markets.get(&MarketType::Spot),
            markets.get(&MarketType::Futures),
        ) else {
            continue;
        };

        for (exchange, spot_cell) in spot {
            let Some(perp_cell) = perp.get(exchange) else {
                continue;
            };
            let (Some(spot_mid), Some(perp_mid)) = (safe_mid(spot_cell), safe_mid(perp_cell))
            else {
                continue;
            };

            entries.push(BasisEntry {
                symbol: symbol.clone(),
                exchange: exchange.clone(),
                spot_mid,
                perp_mid,
                basis_pct: (perp_mid - spot_mid) / spot_mid * 100.0,
                ts: spot_cell.ts.max(perp_cell.ts),
            });
        }
    }

    entries.sort_by(|a, b| b.basis_pct.abs().total_cmp(&a.basis_pct.abs()));
    entries
}
