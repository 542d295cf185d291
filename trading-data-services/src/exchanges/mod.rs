//! Venue integrations and the catalogue mapping feed names to them.

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod coinbase;
pub mod dexscreener;
pub mod gate;
pub mod kraken;
pub mod kucoin;
pub mod mexc;
pub mod okx;

use std::sync::Arc;
use std::time::Duration;

use crate::feeds::adapter::{FeedAdapter, FeedSpec};
use crate::feeds::config::{FeedName, FeedSettings, FeedsConfig};

pub use binance::BinanceStream;
pub use bitget::BitgetStream;
pub use bybit::{BybitStream, BybitTickerPoller};
pub use coinbase::CoinbaseStream;
pub use dexscreener::DexScreenerPoller;
pub use gate::GateStream;
pub use kraken::{KrakenFuturesStream, KrakenSpotPoller};
pub use kucoin::KucoinStream;
pub use mexc::{MexcFuturesPoller, MexcSpotPoller};
pub use okx::OkxStream;

/// Adapter and default timings for one named integration
pub fn build_feed(name: FeedName) -> FeedSpec {
    let (adapter, settings) = match name {
        FeedName::BinanceSpot => (
            FeedAdapter::Stream(Arc::new(BinanceStream::spot())),
            FeedSettings::stream(binance::RECONNECT_DELAY),
        ),
        FeedName::BinanceFutures => (
            FeedAdapter::Stream(Arc::new(BinanceStream::futures())),
            FeedSettings::stream(binance::RECONNECT_DELAY),
        ),
        FeedName::BybitSpot => (
            FeedAdapter::Stream(Arc::new(BybitStream::spot())),
            FeedSettings::stream(bybit::RECONNECT_DELAY),
        ),
        FeedName::BybitFutures => (
            FeedAdapter::Stream(Arc::new(BybitStream::futures())),
            FeedSettings::stream(bybit::RECONNECT_DELAY),
        ),
        FeedName::BybitSpotPoller => (
            FeedAdapter::Poll(Arc::new(BybitTickerPoller::spot())),
            FeedSettings::poll(bybit::SPOT_POLL_INTERVAL, Duration::ZERO),
        ),
        FeedName::BybitFuturesPoller => (
            FeedAdapter::Poll(Arc::new(BybitTickerPoller::futures())),
            FeedSettings::poll(bybit::FUTURES_POLL_INTERVAL, bybit::FUTURES_POLITENESS),
        ),
        FeedName::MexcSpotPoller => (
            FeedAdapter::Poll(Arc::new(MexcSpotPoller)),
            FeedSettings::poll(mexc::POLL_INTERVAL, Duration::ZERO),
        ),
        FeedName::MexcFuturesPoller => (
            FeedAdapter::Poll(Arc::new(MexcFuturesPoller)),
            FeedSettings::poll(mexc::POLL_INTERVAL, mexc::FUTURES_POLITENESS),
        ),
        FeedName::KrakenSpotPoller => (
            FeedAdapter::Poll(Arc::new(KrakenSpotPoller)),
            FeedSettings::poll(kraken::POLL_INTERVAL, Duration::ZERO)
                .with_request_timeout(kraken::REQUEST_TIMEOUT),
        ),
        FeedName::KrakenFutures => (
            FeedAdapter::Stream(Arc::new(KrakenFuturesStream)),
            FeedSettings::stream(kraken::RECONNECT_DELAY),
        ),
        FeedName::OkxSpot => (
            FeedAdapter::Stream(Arc::new(OkxStream::spot())),
            FeedSettings::stream(okx::RECONNECT_DELAY),
        ),
        FeedName::OkxFutures => (
            FeedAdapter::Stream(Arc::new(OkxStream::futures())),
            FeedSettings::stream(okx::RECONNECT_DELAY),
        ),
        FeedName::GateSpot => (
            FeedAdapter::Stream(Arc::new(GateStream::spot())),
            FeedSettings::stream(gate::SPOT_RECONNECT_DELAY),
        ),
        FeedName::GateFutures => (
            FeedAdapter::Stream(Arc::new(GateStream::futures())),
            FeedSettings::stream(gate::FUTURES_RECONNECT_DELAY),
        ),
        FeedName::CoinbaseSpot => (
            FeedAdapter::Stream(Arc::new(CoinbaseStream)),
            FeedSettings::stream(coinbase::RECONNECT_DELAY),
        ),
        FeedName::BitgetSpot => (
            FeedAdapter::Stream(Arc::new(BitgetStream::spot())),
            FeedSettings::stream(bitget::RECONNECT_DELAY),
        ),
        FeedName::BitgetFutures => (
            FeedAdapter::Stream(Arc::new(BitgetStream::futures())),
            FeedSettings::stream(bitget::RECONNECT_DELAY),
        ),
        FeedName::KucoinSpot => (
            FeedAdapter::Stream(Arc::new(KucoinStream::spot())),
            FeedSettings::stream(kucoin::RECONNECT_DELAY),
        ),
        FeedName::KucoinFutures => (
            FeedAdapter::Stream(Arc::new(KucoinStream::futures())),
            FeedSettings::stream(kucoin::RECONNECT_DELAY),
        ),
        FeedName::DexscreenerSpot => (
            FeedAdapter::Poll(Arc::new(DexScreenerPoller)),
            FeedSettings::poll(dexscreener::POLL_INTERVAL, Duration::ZERO)
                .with_request_timeout(dexscreener::REQUEST_TIMEOUT),
        ),
    };

    FeedSpec {
        name,
        adapter,
        settings,
    }
}

/// Every configured integration with config-wide overrides applied
pub fn build_feeds(config: &FeedsConfig) -> Vec<FeedSpec> {
    let mut seen = Vec::with_capacity(config.feeds.len());
    config
        .feeds
        .iter()
        .copied()
        .filter(|name| {
            if seen.contains(name) {
                false
            } else {
                seen.push(*name);
                true
            }
        })
        .map(|name| {
            let mut spec = build_feed(name);
            spec.settings = config.tune(spec.settings);
            spec
        })
        .collect()
}
