use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use trading_core::{now_ms, QuoteStore, SpreadEngine, TimestampMS};

use crate::protocol::*;

/// Frames a slow subscriber may fall behind before it starts skipping
pub const UPDATE_BUFFER: usize = 16;

/// Periodic publisher of `market.update` notifications.
///
/// Each tick takes one snapshot, ranks it, serializes the notification once
/// and fans the same line out to every subscribed connection.
pub struct Broadcaster {
    store: Arc<QuoteStore>,
    engine: SpreadEngine,
    interval: Duration,
    tx: broadcast::Sender<Arc<str>>,
}

impl Broadcaster {
    pub fn new(
        store: Arc<QuoteStore>,
        engine: SpreadEngine,
        interval: Duration,
        capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            engine,
            interval,
            tx,
        }
    }

    /// Register a connection; it receives every update published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Build the payload for one tick
    pub fn build_update(&self, now: TimestampMS) -> MarketUpdate {
        let snapshot = self.store.snapshot();
        let spreads = self.engine.compute_spot_spreads(&snapshot, now);
        MarketUpdate {
            snapshot,
            spreads,
            ts: now,
        }
    }

    /// Publish one update.
    ///
    /// # Returns
    /// Number of subscribers the frame was queued for; zero when nobody is
    /// listening, in which case nothing is computed
    pub fn tick(&self, now: TimestampMS) -> Result<usize, serde_json::Error> {
        if self.tx.receiver_count() == 0 {
            return Ok(0);
        }

        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "market.update".to_string(),
            params: self.build_update(now),
        };
        let line: Arc<str> = Arc::from(serde_json::to_string(&notification)?);

        // A send error only means every receiver left since the check above
        Ok(self.tx.send(line).unwrap_or(0))
    }

    /// Publish on a fixed period until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Broadcaster started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick(now_ms()) {
                        Ok(0) => {}
                        Ok(n) => tracing::trace!(subscribers = n, "Published market update"),
                        Err(e) => tracing::error!("Failed to serialize market update: {}", e),
                    }
                }
            }
        }

        tracing::info!("Broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading_core::{CanonicalSymbol, MarketType, Quote};

    fn broadcaster() -> Broadcaster {
        let store = Arc::new(QuoteStore::new());
        let symbol = CanonicalSymbol::parse("BTC-USDT").unwrap();
        for (exchange, bid, ask) in [("binance", 100.0, 100.5), ("okx", 101.0, 101.5)] {
            store.upsert(
                Quote::new(exchange, MarketType::Spot, symbol.clone(), bid, ask, 1).unwrap(),
            );
        }
        Broadcaster::new(store, SpreadEngine::default(), Duration::from_millis(700), 4)
    }

    #[test]
    fn test_tick_without_subscribers() {
        let broadcaster = broadcaster();
        assert_eq!(broadcaster.tick(5).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_the_same_frame() {
        let broadcaster = broadcaster();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        assert_eq!(broadcaster.tick(42).unwrap(), 2);

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let frame: serde_json::Value = serde_json::from_str(&a).unwrap();
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["method"], "market.update");
        assert_eq!(frame["params"]["ts"], 42);
        assert_eq!(frame["params"]["snapshot"]["BTC-USDT"]["spot"]["okx"]["bid"], 101.0);
        assert_eq!(frame["params"]["spreads"][0]["buyFrom"], "binance");
        assert_eq!(frame["params"]["spreads"][0]["sellTo"], "okx");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let broadcaster = broadcaster();
        let mut slow = broadcaster.subscribe();

        for ts in 0..6 {
            broadcaster.tick(ts).unwrap();
        }

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        let frame: serde_json::Value = serde_json::from_str(&slow.recv().await.unwrap()).unwrap();
        assert_eq!(frame["params"]["ts"], 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let broadcaster = Arc::new(broadcaster());
        let mut rx = broadcaster.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&broadcaster).run(cancel.clone()));

        assert!(rx.recv().await.is_ok());
        cancel.cancel();
        task.await.unwrap();
    }
}
