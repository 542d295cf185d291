use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trading_core::types::SymbolError;
use trading_core::CanonicalSymbol;

use crate::feeds::backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};

/// Pairs tracked when no list is configured
pub const DEFAULT_TRACKED_SYMBOLS: &[&str] = &[
    // Brazil view
    "BRL-USDT",
    // Majors
    "BTC-USDT", "ETH-USDT", "BNB-USDT", "SOL-USDT", "XRP-USDT", "ADA-USDT", "DOGE-USDT",
    "TRX-USDT", "MATIC-USDT", "LTC-USDT", "LINK-USDT", "BCH-USDT", "DOT-USDT", "AVAX-USDT",
    "TON-USDT", "ATOM-USDT", "ETC-USDT",
    // Layer 2 and infra
    "OP-USDT", "ARB-USDT", "BASE-USDT", "MANTA-USDT", "METIS-USDT", "COTI-USDT", "SKL-USDT",
    // Alt L1s
    "NEAR-USDT", "APT-USDT", "SUI-USDT", "FTM-USDT", "ALGO-USDT", "XTZ-USDT", "KAS-USDT",
    "ICP-USDT", "FIL-USDT", "HNT-USDT",
    // AI and DePIN
    "RNDR-USDT", "FET-USDT", "AGIX-USDT", "OCEAN-USDT", "WLD-USDT", "TAO-USDT", "GRT-USDT",
    "NKN-USDT", "MDT-USDT",
    // DeFi
    "AAVE-USDT", "CRV-USDT", "SNX-USDT", "COMP-USDT", "UNI-USDT", "YFI-USDT", "LDO-USDT",
    "RPL-USDT",
    // Newer listings
    "TIA-USDT", "SEI-USDT", "PYTH-USDT", "JUP-USDT", "ENA-USDT", "PORTAL-USDT", "AEVO-USDT",
    "ALT-USDT",
    // Memes
    "PEPE-USDT", "SHIB-USDT", "WIF-USDT", "FLOKI-USDT", "BONK-USDT", "MEME-USDT", "DOG-USDT",
    // Stablecoins
    "USDC-USDT", "FDUSD-USDT", "TUSD-USDT", "DAI-USDT",
    // Commodity tokens
    "XAU-USDT", "XAG-USDT",
];

/// Every integration the service knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedName {
    BinanceSpot,
    BinanceFutures,
    BybitSpot,
    BybitFutures,
    BybitSpotPoller,
    BybitFuturesPoller,
    MexcSpotPoller,
    MexcFuturesPoller,
    KrakenSpotPoller,
    KrakenFutures,
    OkxSpot,
    OkxFutures,
    GateSpot,
    GateFutures,
    CoinbaseSpot,
    BitgetSpot,
    BitgetFutures,
    KucoinSpot,
    KucoinFutures,
    DexscreenerSpot,
}

impl FeedName {
    pub const ALL: [FeedName; 20] = [
        FeedName::BinanceSpot,
        FeedName::BinanceFutures,
        FeedName::BybitSpot,
        FeedName::BybitFutures,
        FeedName::BybitSpotPoller,
        FeedName::BybitFuturesPoller,
        FeedName::MexcSpotPoller,
        FeedName::MexcFuturesPoller,
        FeedName::KrakenSpotPoller,
        FeedName::KrakenFutures,
        FeedName::OkxSpot,
        FeedName::OkxFutures,
        FeedName::GateSpot,
        FeedName::GateFutures,
        FeedName::CoinbaseSpot,
        FeedName::BitgetSpot,
        FeedName::BitgetFutures,
        FeedName::KucoinSpot,
        FeedName::KucoinFutures,
        FeedName::DexscreenerSpot,
    ];

    /// Feeds started when none are configured
    pub const DEFAULT_ENABLED: [FeedName; 6] = [
        FeedName::BinanceSpot,
        FeedName::BinanceFutures,
        FeedName::BybitSpotPoller,
        FeedName::BybitFutures,
        FeedName::MexcSpotPoller,
        FeedName::MexcFuturesPoller,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedName::BinanceSpot => "binance-spot",
            FeedName::BinanceFutures => "binance-futures",
            FeedName::BybitSpot => "bybit-spot",
            FeedName::BybitFutures => "bybit-futures",
            FeedName::BybitSpotPoller => "bybit-spot-poller",
            FeedName::BybitFuturesPoller => "bybit-futures-poller",
            FeedName::MexcSpotPoller => "mexc-spot-poller",
            FeedName::MexcFuturesPoller => "mexc-futures-poller",
            FeedName::KrakenSpotPoller => "kraken-spot-poller",
            FeedName::KrakenFutures => "kraken-futures",
            FeedName::OkxSpot => "okx-spot",
            FeedName::OkxFutures => "okx-futures",
            FeedName::GateSpot => "gate-spot",
            FeedName::GateFutures => "gate-futures",
            FeedName::CoinbaseSpot => "coinbase-spot",
            FeedName::BitgetSpot => "bitget-spot",
            FeedName::BitgetFutures => "bitget-futures",
            FeedName::KucoinSpot => "kucoin-spot",
            FeedName::KucoinFutures => "kucoin-futures",
            FeedName::DexscreenerSpot => "dexscreener-spot",
        }
    }

    /// Display label for status listings, e.g. "bybit-spot(poller)"
    pub fn label(&self) -> String {
        match self.as_str().strip_suffix("-poller") {
            Some(base) => format!("{}(poller)", base),
            None => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for FeedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FeedName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| format!("unknown feed: {}", s))
    }
}

/// Timing knobs for one integration
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Delay policy between reconnects (streams) or after failed cycles (pollers)
    pub backoff: Arc<dyn BackoffPolicy>,
    pub connect_timeout: Duration,
    /// Pause between full poll cycles
    pub poll_interval: Duration,
    /// Minimum spacing between per-symbol requests
    pub politeness: Duration,
    pub request_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            backoff: Arc::new(FixedBackoff::new(Duration::from_secs(3))),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
            politeness: Duration::ZERO,
            request_timeout: Duration::from_secs(8),
        }
    }
}

impl FeedSettings {
    /// Websocket feed reconnecting after a fixed delay
    pub fn stream(reconnect: Duration) -> Self {
        Self {
            backoff: Arc::new(FixedBackoff::new(reconnect)),
            ..Self::default()
        }
    }

    /// REST poller
    pub fn poll(interval: Duration, politeness: Duration) -> Self {
        Self {
            backoff: Arc::new(FixedBackoff::new(interval)),
            poll_interval: interval,
            politeness,
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Which feeds to run and for which pairs
#[derive(Debug, Clone)]
pub struct FeedsConfig {
    pub symbols: Vec<CanonicalSymbol>,
    pub feeds: Vec<FeedName>,
    /// Overrides every integration's own REST timeout when set
    pub request_timeout: Option<Duration>,
    /// Replace fixed reconnect delays with doubling delays capped at this value
    pub max_backoff: Option<Duration>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_TRACKED_SYMBOLS
                .iter()
                .filter_map(|s| CanonicalSymbol::parse(s).ok())
                .collect(),
            feeds: FeedName::DEFAULT_ENABLED.to_vec(),
            request_timeout: None,
            max_backoff: None,
        }
    }
}

impl FeedsConfig {
    /// Parse a list of canonical symbols, rejecting the first malformed entry
    pub fn parse_symbols<S: AsRef<str>>(raw: &[S]) -> Result<Vec<CanonicalSymbol>, SymbolError> {
        let mut symbols: Vec<CanonicalSymbol> = Vec::with_capacity(raw.len());
        for s in raw {
            let symbol = CanonicalSymbol::parse(s.as_ref().trim())?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    /// Apply config-wide overrides to an integration's own settings
    pub fn tune(&self, settings: FeedSettings) -> FeedSettings {
        let initial = settings.backoff.delay(1);
        let settings = match self.request_timeout {
            Some(timeout) => settings.with_request_timeout(timeout),
            None => settings,
        };
        match self.max_backoff {
            Some(max) => settings.with_backoff(Arc::new(ExponentialBackoff::new(initial, max))),
            None => settings,
        }
    }
}
