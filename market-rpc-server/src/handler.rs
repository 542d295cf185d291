use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use trading_core::{
    compute_basis, now_ms, BasisEntry, CanonicalSymbol, QuoteStore, SpreadEngine,
    SpreadOpportunity,
};
use trading_data_services::FeedBoard;

use crate::error::RpcError;
use crate::protocol::*;

/// Answers read queries against the shared quote store.
///
/// Every call works on its own snapshot.
pub struct MarketQueryHandler {
    store: Arc<QuoteStore>,
    engine: SpreadEngine,
    feeds: FeedBoard,
    broadcast_interval: Duration,
}

impl MarketQueryHandler {
    pub fn new(store: Arc<QuoteStore>, engine: SpreadEngine, feeds: FeedBoard) -> Self {
        Self {
            store,
            engine,
            feeds,
            broadcast_interval: Duration::from_millis(700),
        }
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Handle a market.status request
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            ok: true,
            exchanges: self.feeds.labels(),
            feeds: self.feeds.statuses(),
            active: self.feeds.active_count(),
            updated: now_ms(),
        }
    }

    /// Handle a market.snapshot request.
    ///
    /// # Arguments
    /// * `params` - Optional symbol filter
    ///
    /// # Returns
    /// The whole table plus ranked spreads, or one symbol's slice of both
    pub fn snapshot(&self, params: SnapshotParams) -> Result<SnapshotResponse, RpcError> {
        let snapshot = self.store.snapshot();
        let spreads = self.engine.compute_spot_spreads(&snapshot, now_ms());

        let Some(raw) = params.symbol else {
            return Ok(SnapshotResponse {
                data: serde_json::to_value(&snapshot)?,
                spreads,
            });
        };

        let symbol = CanonicalSymbol::parse(raw.trim())
            .map_err(|e| RpcError::InvalidParams(format!("symbol: {}", e)))?;
        let markets = snapshot
            .markets(symbol.as_str())
            .ok_or_else(|| RpcError::SymbolNotFound(symbol.to_string()))?;

        tracing::debug!("Snapshot query for {}", symbol);

        let data: BTreeMap<&CanonicalSymbol, _> = BTreeMap::from([(&symbol, markets)]);
        Ok(SnapshotResponse {
            data: serde_json::to_value(data)?,
            spreads: spreads.into_iter().filter(|s| s.symbol == symbol).collect(),
        })
    }

    /// Acknowledge a market.subscribe request
    pub fn hello(&self) -> Hello {
        Hello {
            msg: "subscribed".to_string(),
            interval_ms: self.broadcast_interval.as_millis() as u64,
        }
    }

    /// Handle a market.spreads request
    pub fn spreads(&self, params: ListParams) -> Result<Vec<SpreadOpportunity>, RpcError> {
        let max = self.engine.limit();
        let limit = match params.limit {
            None => max,
            Some(n) if n > max => return Err(RpcError::LimitOutOfRange { requested: n, max }),
            Some(n) => positive(n)?,
        };
        let mut spreads = self
            .engine
            .compute_spot_spreads(&self.store.snapshot(), now_ms());
        spreads.truncate(limit);
        Ok(spreads)
    }

    /// Handle a market.basis request
    pub fn basis(&self, params: ListParams) -> Result<Vec<BasisEntry>, RpcError> {
        let mut entries = compute_basis(&self.store.snapshot());
        if let Some(n) = params.limit {
            entries.truncate(positive(n)?);
        }
        Ok(entries)
    }
}

fn positive(limit: usize) -> Result<usize, RpcError> {
    if limit == 0 {
        return Err(RpcError::InvalidParams("limit must be positive".to_string()));
    }
    Ok(limit)
}
