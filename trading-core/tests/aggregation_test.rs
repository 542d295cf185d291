/// End-to-end tests for the aggregation core
///
/// These tests cover:
/// - Symbol normalization across exchange naming schemes
/// - Store semantics under concurrent writers
/// - Spread ranking and the top-N bound
use std::sync::Arc;
use std::thread;
use trading_core::{
    compute_spot_spreads, normalize, CanonicalSymbol, MarketType, Quote, QuoteStore, QuoteUpdate,
    SpreadKind,
};

fn spot_quote(exchange: &str, symbol: &str, bid: f64, ask: f64) -> Quote {
    Quote::new(
        exchange,
        MarketType::Spot,
        CanonicalSymbol::parse(symbol).unwrap(),
        bid,
        ask,
        1_730_540_000_000,
    )
    .unwrap()
}

#[cfg(test)]
mod normalization {
    use super::*;

    #[test]
    fn test_exchange_naming_schemes() {
        assert_eq!(normalize("binance", "BTCUSDT", MarketType::Spot).unwrap(), "BTC-USDT");
        assert_eq!(normalize("kraken", "XBTUSDT", MarketType::Spot).unwrap(), "BTC-USDT");
        assert_eq!(
            normalize("okx", "BTC-USDT-SWAP", MarketType::Futures).unwrap(),
            "BTC-USDT"
        );
        assert_eq!(
            normalize("kraken-futures", "PI_XBTUSD", MarketType::Futures).unwrap(),
            "BTC-USD"
        );
    }

    #[test]
    fn test_idempotent_on_canonical_output() {
        let raws = [
            ("binance", "SOLUSDT", MarketType::Spot),
            ("gate", "DOGE_USDT", MarketType::Futures),
            ("kucoin", "XBTUSDTM", MarketType::Futures),
            ("okx", "ETH-USDT-SWAP", MarketType::Futures),
            ("coinbase", "BTC-USD", MarketType::Spot),
        ];
        for (exchange, raw, market) in raws {
            let once = normalize(exchange, raw, market).unwrap();
            assert!(CanonicalSymbol::parse(&once).is_ok(), "{} -> {}", raw, once);
            assert_eq!(normalize(exchange, &once, market).unwrap(), once);
        }
    }
}

#[cfg(test)]
mod spreads {
    use super::*;

    #[test]
    fn test_ranking_example() {
        let store = QuoteStore::new();
        store.upsert(spot_quote("A", "BTC-USDT", 100.0, 101.0));
        store.upsert(spot_quote("B", "BTC-USDT", 103.0, 104.0));
        store.upsert(spot_quote("C", "BTC-USDT", 99.0, 100.0));

        let spreads = compute_spot_spreads(&store.snapshot(), 0);

        let top = &spreads[0];
        assert_eq!(top.kind, SpreadKind::SpotSpot);
        assert_eq!(top.buy_exchange, "C");
        assert_eq!(top.sell_exchange, "B");
        assert_eq!(top.buy_ask, 100.0);
        assert_eq!(top.sell_bid, 103.0);
        assert!((top.edge_percent - 3.0).abs() < 1e-9);

        assert!(spreads.iter().all(|s| s.edge_percent >= 0.0));
        assert!(spreads.iter().all(|s| s.buy_exchange != s.sell_exchange));
        // Buying at B's ask of 104 never clears anyone's bid
        assert!(spreads.iter().all(|s| s.buy_exchange != "B"));
    }

    #[test]
    fn test_top_twenty_bound() {
        let store = QuoteStore::new();
        // 30 symbols, each with one positive edge
        for i in 0..30 {
            let symbol = format!("T{}-USDT", i);
            store.upsert(spot_quote("cheap", &symbol, 100.0, 100.0));
            store.upsert(spot_quote("rich", &symbol, 101.0 + i as f64, 200.0));
        }

        let spreads = compute_spot_spreads(&store.snapshot(), 0);
        assert_eq!(spreads.len(), 20);
        for pair in spreads.windows(2) {
            assert!(pair[0].edge_percent >= pair[1].edge_percent);
        }
        assert_eq!(spreads[0].symbol.as_str(), "T29-USDT");
    }
}

#[cfg(test)]
mod store {
    use super::*;

    #[test]
    fn test_concurrent_writers_keep_one_cell_per_key() {
        let store = Arc::new(QuoteStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        let exchange = format!("ex{}", t % 4);
                        store.upsert(spot_quote(&exchange, "ETH-USDT", i as f64, i as f64 + 1.0));
                        let _ = store.snapshot();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 4);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.exchanges("ETH-USDT", MarketType::Spot).unwrap().len(), 4);
    }

    #[test]
    fn test_missing_symbol_changes_nothing() {
        let store = QuoteStore::new();
        store.upsert(spot_quote("binance", "BTC-USDT", 1.0, 2.0));
        let before = store.snapshot();

        let update: QuoteUpdate = serde_json::from_str(
            r#"{"exchange":"binance","marketType":"spot","bid":5.0,"ask":6.0}"#,
        )
        .unwrap();
        assert!(!store.upsert_update(update));
        assert_eq!(store.snapshot(), before);
    }
}
