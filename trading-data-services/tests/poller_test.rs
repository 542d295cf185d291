/// Poll harness tests driven by a scripted HTTP transport
///
/// These tests cover:
/// - Circuit breaker on per-symbol rejections
/// - Transient failures being retried
/// - Batch first, per-symbol fallback
/// - Candidate requests tried in order
/// - Warn-once keys and the politeness throttle
/// - Supervisor sharding and status reporting
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use trading_core::{CanonicalSymbol, MarketType, QuoteStore};
use trading_data_services::exchanges::{BybitTickerPoller, KrakenSpotPoller, MexcFuturesPoller};
use trading_data_services::feeds::{
    DecodeError, FeedAdapter, FeedError, FeedId, FeedName, FeedSettings, FeedSpec, FeedState,
    FeedSupervisor, FetchError, HttpFetcher, PollAdapter, PollWorker, RawQuote, StreamAdapter,
};

type Responder = Box<dyn Fn(&str) -> Result<Value, FetchError> + Send + Sync>;

/// Answers every request through `respond` and records the URLs asked for
struct ScriptedHttp {
    requests: Mutex<Vec<String>>,
    respond: Responder,
}

impl ScriptedHttp {
    fn new(respond: impl Fn(&str) -> Result<Value, FetchError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn take_requests(&self) -> Vec<String> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

#[async_trait]
impl HttpFetcher for ScriptedHttp {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        (self.respond)(url)
    }

    async fn post_json(&self, url: &str, _body: &Value) -> Result<Value, FetchError> {
        self.get_json(url).await
    }
}

fn symbols(raw: &[&str]) -> Vec<CanonicalSymbol> {
    raw.iter().map(|s| CanonicalSymbol::parse(s).unwrap()).collect()
}

fn worker(
    name: FeedName,
    adapter: Arc<dyn PollAdapter>,
    tracked: &[&str],
    store: &Arc<QuoteStore>,
    http: &Arc<ScriptedHttp>,
) -> PollWorker {
    let settings = FeedSettings::poll(Duration::from_secs(1), Duration::ZERO);
    worker_with(name, adapter, tracked, store, http, settings)
}

fn worker_with(
    name: FeedName,
    adapter: Arc<dyn PollAdapter>,
    tracked: &[&str],
    store: &Arc<QuoteStore>,
    http: &Arc<ScriptedHttp>,
    settings: FeedSettings,
) -> PollWorker {
    let (tx, _rx) = watch::channel(FeedState::Disconnected);
    let http: Arc<dyn HttpFetcher> = http.clone();
    PollWorker::new(
        FeedId::new(name, 0),
        adapter,
        symbols(tracked),
        Arc::clone(store),
        http,
        settings,
        tx,
    )
}

fn bybit_ticker(symbol: &str, bid: &str, ask: &str) -> Value {
    json!({"retCode": 0, "retMsg": "OK", "result": {"list": [
        {"symbol": symbol, "bid1Price": bid, "ask1Price": ask}
    ]}})
}

#[cfg(test)]
mod circuit_breaker {
    use super::*;

    #[tokio::test]
    async fn test_rejected_symbol_is_not_requested_again() {
        let http = ScriptedHttp::new(|url| {
            if url.ends_with("symbol=XAUUSDT") {
                Err(FetchError::Status(403))
            } else {
                Ok(bybit_ticker("BTCUSDT", "62000", "62001"))
            }
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::BybitFuturesPoller,
            Arc::new(BybitTickerPoller::futures()),
            &["BTC-USDT", "XAU-USDT"],
            &store,
            &http,
        );

        let first = poller.run_cycle().await;
        assert_eq!(first.requests, 2);
        assert_eq!(first.newly_disabled, symbols(&["XAU-USDT"]));
        assert_eq!(http.take_requests().len(), 2);

        let second = poller.run_cycle().await;
        assert!(second.newly_disabled.is_empty());
        let requested = http.take_requests();
        assert_eq!(requested.len(), 1);
        assert!(requested[0].ends_with("symbol=BTCUSDT"));

        assert!(poller.breaker().is_open(&symbols(&["XAU-USDT"])[0]));
        let cell = store
            .snapshot()
            .get("BTC-USDT", MarketType::Futures, "bybit")
            .copied()
            .unwrap();
        assert_eq!(cell.bid, 62000.0);
    }

    #[tokio::test]
    async fn test_venue_rejection_code_trips_breaker() {
        let http = ScriptedHttp::new(|_| {
            Ok(json!({"retCode": 10001, "retMsg": "Not supported symbols", "result": {}}))
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::BybitSpotPoller,
            Arc::new(BybitTickerPoller::spot()),
            &["PORTAL-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert_eq!(report.newly_disabled.len(), 1);
        assert_eq!(poller.breaker().disabled_count(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let http = ScriptedHttp::new(|url| {
            if url.ends_with("symbol=ETHUSDT") {
                Err(FetchError::Status(503))
            } else {
                Ok(bybit_ticker("BTCUSDT", "62000", "62001"))
            }
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::BybitSpotPoller,
            Arc::new(BybitTickerPoller::spot()),
            &["BTC-USDT", "ETH-USDT"],
            &store,
            &http,
        );

        for _ in 0..3 {
            let report = poller.run_cycle().await;
            assert!(report.newly_disabled.is_empty());
            assert_eq!(http.take_requests().len(), 2);
        }
        assert_eq!(poller.breaker().disabled_count(), 0);
    }

    #[tokio::test]
    async fn test_throttling_is_not_a_rejection() {
        let http = ScriptedHttp::new(|_| Err(FetchError::Status(429)));
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::BybitSpotPoller,
            Arc::new(BybitTickerPoller::spot()),
            &["BTC-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert!(report.newly_disabled.is_empty());
        assert_eq!(report.responses, 0);
    }
}

#[cfg(test)]
mod batch {
    use super::*;

    const BATCH: &str = "https://contract.mexc.com/api/v1/contract/ticker?symbol=all";

    #[tokio::test]
    async fn test_batch_serves_the_cycle() {
        let http = ScriptedHttp::new(|url| {
            assert_eq!(url, BATCH);
            Ok(json!({"success": true, "data": [
                {"symbol": "BTC_USDT", "bid1": 62000.0, "ask1": 62000.5},
                {"symbol": "DOGE_USDT", "bid1": 0.1, "ask1": 0.1001}
            ]}))
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::MexcFuturesPoller,
            Arc::new(MexcFuturesPoller),
            &["BTC-USDT", "ETH-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert!(report.batch_served);
        assert_eq!(report.requests, 1);
        assert_eq!(report.upserts, 1);

        // Untracked rows are ignored
        let snapshot = store.snapshot();
        assert!(snapshot.get("BTC-USDT", MarketType::Futures, "mexc").is_some());
        assert!(snapshot.get("DOGE-USDT", MarketType::Futures, "mexc").is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_to_symbols() {
        let http = ScriptedHttp::new(|url| {
            if url == BATCH {
                return Err(FetchError::Status(404));
            }
            Ok(json!({"success": true, "data": {"symbol": "ETH_USDT", "bid1": "2500", "ask1": "2500.5"}}))
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::MexcFuturesPoller,
            Arc::new(MexcFuturesPoller),
            &["ETH-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert!(!report.batch_served);
        assert_eq!(report.upserts, 1);
        assert_eq!(
            http.take_requests(),
            vec![
                BATCH.to_string(),
                "https://contract.mexc.com/api/v1/contract/ticker?symbol=ETH_USDT".to_string(),
            ]
        );
        // A failed batch never disables anything
        assert_eq!(poller.breaker().disabled_count(), 0);
    }
}

#[cfg(test)]
mod candidates {
    use super::*;

    #[tokio::test]
    async fn test_second_candidate_answers() {
        let http = ScriptedHttp::new(|url| {
            if url.ends_with("pair=XBTUSDT") {
                Ok(json!({"error": ["EQuery:Unknown asset pair"]}))
            } else {
                Ok(json!({"error": [], "result": {"XXBTZUSD": {"a": ["62001.0", "1", "1"], "b": ["62000.0", "1", "1"]}}}))
            }
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::KrakenSpotPoller,
            Arc::new(KrakenSpotPoller),
            &["BTC-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert_eq!(report.requests, 2);
        assert!(report.newly_disabled.is_empty());

        // Stored under the tracked symbol, not Kraken's pair name
        let cell = store
            .snapshot()
            .get("BTC-USDT", MarketType::Spot, "kraken")
            .copied()
            .unwrap();
        assert_eq!(cell.ask, 62001.0);
    }

    #[tokio::test]
    async fn test_all_candidates_rejected_disables_symbol() {
        let http = ScriptedHttp::new(|_| Ok(json!({"error": ["EQuery:Unknown asset pair"]})));
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::KrakenSpotPoller,
            Arc::new(KrakenSpotPoller),
            &["WIF-USDT"],
            &store,
            &http,
        );

        let report = poller.run_cycle().await;
        assert_eq!(report.requests, 2);
        assert_eq!(report.newly_disabled, symbols(&["WIF-USDT"]));

        http.take_requests();
        poller.run_cycle().await;
        assert!(http.take_requests().is_empty());
    }
}

#[cfg(test)]
mod pacing {
    use super::*;

    #[tokio::test]
    async fn test_repeated_body_errors_warn_once() {
        let calls = AtomicUsize::new(0);
        let http = ScriptedHttp::new(move |_| {
            let column = calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Body(format!("expected value at line 1 column {}", column)))
        });
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker(
            FeedName::BybitSpotPoller,
            Arc::new(BybitTickerPoller::spot()),
            &["BTC-USDT"],
            &store,
            &http,
        );

        for _ in 0..10 {
            poller.run_cycle().await;
        }
        assert_eq!(http.take_requests().len(), 10);
        assert_eq!(poller.logged_conditions(), 1);
        assert_eq!(poller.breaker().disabled_count(), 0);
    }

    #[tokio::test]
    async fn test_politeness_spaces_symbol_requests() {
        let http = ScriptedHttp::new(|_| Ok(bybit_ticker("BTCUSDT", "1", "2")));
        let store = Arc::new(QuoteStore::new());
        let mut poller = worker_with(
            FeedName::BybitFuturesPoller,
            Arc::new(BybitTickerPoller::futures()),
            &["BTC-USDT", "ETH-USDT", "SOL-USDT"],
            &store,
            &http,
            FeedSettings::poll(Duration::from_secs(3), Duration::from_millis(80)),
        );

        // The throttle runs on its own clock, so this measures wall time
        let started = Instant::now();
        let report = poller.run_cycle().await;
        let elapsed = started.elapsed();

        assert_eq!(report.requests, 3);
        assert_eq!(report.upserts, 3);
        // First request is free, the next two wait one period each
        assert!(elapsed >= Duration::from_millis(150), "elapsed {:?}", elapsed);
    }
}

#[cfg(test)]
mod supervisor {
    use super::*;

    /// Stream adapter whose endpoint never resolves, so workers only back off
    struct Unreachable;

    #[async_trait]
    impl StreamAdapter for Unreachable {
        fn exchange(&self) -> &'static str {
            "binance"
        }

        fn market_type(&self) -> MarketType {
            MarketType::Spot
        }

        fn max_instruments_per_connection(&self) -> Option<usize> {
            Some(60)
        }

        fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
            Some(symbol.as_str().replace('-', "").to_lowercase())
        }

        async fn endpoint(
            &self,
            _attempt: u32,
            _instruments: &[String],
            _http: &dyn HttpFetcher,
        ) -> Result<String, FeedError> {
            Err(FeedError::Endpoint("offline".into()))
        }

        fn subscribe_messages(&self, _instruments: &[String]) -> Vec<String> {
            Vec::new()
        }

        fn decode(&self, _text: &str) -> Result<Option<RawQuote>, DecodeError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_stream_feed_is_sharded() {
        let http = ScriptedHttp::new(|_| Err(FetchError::Timeout));
        let store = Arc::new(QuoteStore::new());
        let mut supervisor = FeedSupervisor::new(store, http);

        let tracked: Vec<CanonicalSymbol> = (0..130)
            .map(|i| CanonicalSymbol::parse(&format!("T{}-USDT", i)).unwrap())
            .collect();
        let spec = FeedSpec {
            name: FeedName::BinanceSpot,
            adapter: FeedAdapter::Stream(Arc::new(Unreachable)),
            settings: FeedSettings::stream(Duration::from_secs(3)),
        };

        assert_eq!(supervisor.spawn(spec, &tracked), 3);
        let statuses = supervisor.statuses();
        let ids: Vec<&str> = statuses.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["binance-spot", "binance-spot#1", "binance-spot#2"]);
        assert_eq!(supervisor.labels(), vec!["binance-spot".to_string()]);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_poller_reports_active_state() {
        let http = ScriptedHttp::new(|_| Ok(bybit_ticker("BTCUSDT", "1", "2")));
        let store = Arc::new(QuoteStore::new());
        let mut supervisor = FeedSupervisor::new(Arc::clone(&store), http);

        let spec = FeedSpec {
            name: FeedName::BybitSpotPoller,
            adapter: FeedAdapter::Poll(Arc::new(BybitTickerPoller::spot())),
            settings: FeedSettings::poll(Duration::from_secs(60), Duration::ZERO),
        };
        assert_eq!(supervisor.spawn(spec, &symbols(&["BTC-USDT"])), 1);

        let mut active = false;
        for _ in 0..50 {
            if supervisor.statuses()[0].state == FeedState::Active {
                active = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(active);
        assert_eq!(supervisor.labels(), vec!["bybit-spot(poller)".to_string()]);
        assert_eq!(store.len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_fully_tripped_poller_is_idle_not_down() {
        let http = ScriptedHttp::new(|_| Err(FetchError::Status(403)));
        let store = Arc::new(QuoteStore::new());
        let mut supervisor = FeedSupervisor::new(Arc::clone(&store), http.clone());

        let spec = FeedSpec {
            name: FeedName::BybitSpotPoller,
            adapter: FeedAdapter::Poll(Arc::new(BybitTickerPoller::spot())),
            settings: FeedSettings::poll(Duration::from_millis(10), Duration::ZERO),
        };
        assert_eq!(supervisor.spawn(spec, &symbols(&["XAU-USDT"])), 1);

        // Many cycles pass after the only symbol is disabled
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(http.take_requests().len(), 1);
        assert_eq!(supervisor.statuses()[0].state, FeedState::Active);
        assert!(store.is_empty());

        supervisor.shutdown().await;
    }
}
