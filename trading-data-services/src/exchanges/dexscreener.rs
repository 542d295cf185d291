use serde_json::Value;
use std::time::Duration;
use trading_core::{CanonicalSymbol, MarketType};

use crate::feeds::adapter::{DecodeError, PollAdapter, RawQuote};
use crate::feeds::json::{price, str_at};

const SEARCH_URL: &str = "https://api.dexscreener.com/latest/dex/search";

pub const POLL_INTERVAL: Duration = Duration::from_secs(6);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(9);

/// Half-width of the synthetic spread put around `priceUsd`
const SYNTHETIC_HALF_SPREAD: f64 = 0.0001;

struct WatchItem {
    symbol: &'static str,
    /// URL-encoded search terms
    query: &'static str,
    chains: &'static [&'static str],
}

const WATCH_LIST: &[WatchItem] = &[
    WatchItem {
        symbol: "BNB-USDT",
        query: "BNB%20USDT",
        chains: &["bsc"],
    },
    WatchItem {
        symbol: "USDC-USDT",
        query: "USDC%20USDT",
        chains: &["ethereum", "arbitrum", "base"],
    },
    WatchItem {
        symbol: "CAKE-USDT",
        query: "CAKE%20USDT",
        chains: &["bsc"],
    },
    WatchItem {
        symbol: "MATIC-USDT",
        query: "MATIC%20USDT",
        chains: &["polygon"],
    },
];

fn watch_item(symbol: &CanonicalSymbol) -> Option<&'static WatchItem> {
    WATCH_LIST.iter().find(|w| w.symbol == symbol.as_str())
}

fn liquidity_usd(pair: &Value) -> f64 {
    pair.get("liquidity")
        .and_then(|l| l.get("usd"))
        .and_then(price)
        .unwrap_or(0.0)
}

/// Deepest pool on a preferred chain, or on any chain when none match
fn best_pair<'a>(pairs: &'a [Value], chains: &[&str]) -> Option<&'a Value> {
    let on_chain = |pair: &&Value| {
        str_at(pair, &["chainId", "chain", "chainName"])
            .map(|c| chains.iter().any(|want| want.eq_ignore_ascii_case(c)))
            .unwrap_or(false)
    };
    let preferred: Vec<&Value> = pairs.iter().filter(on_chain).collect();
    let candidates: Vec<&Value> = if preferred.is_empty() {
        pairs.iter().collect()
    } else {
        preferred
    };
    candidates
        .into_iter()
        .max_by(|a, b| liquidity_usd(a).total_cmp(&liquidity_usd(b)))
}

/// DexScreener search API for a fixed watch list of on-chain pools.
///
/// DEX pools have no order book; the USD price becomes a mid with a
/// synthetic spread around it.
pub struct DexScreenerPoller;

impl PollAdapter for DexScreenerPoller {
    fn exchange(&self) -> &'static str {
        "dexscreener"
    }

    fn market_type(&self) -> MarketType {
        MarketType::Spot
    }

    fn symbol_urls(&self, symbol: &CanonicalSymbol) -> Vec<String> {
        watch_item(symbol)
            .map(|w| vec![format!("{}?q={}", SEARCH_URL, w.query)])
            .unwrap_or_default()
    }

    fn decode_symbol(
        &self,
        symbol: &CanonicalSymbol,
        body: &Value,
    ) -> Result<Option<RawQuote>, DecodeError> {
        let chains = watch_item(symbol).map(|w| w.chains).unwrap_or(&[]);
        let pairs = body
            .get("pairs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let Some(pair) = best_pair(pairs, chains) else {
            return Ok(None);
        };
        let Some(mid) = pair.get("priceUsd").and_then(price).filter(|p| *p > 0.0) else {
            return Ok(None);
        };

        Ok(Some(RawQuote::new(
            symbol.as_str(),
            mid * (1.0 - SYNTHETIC_HALF_SPREAD),
            mid * (1.0 + SYNTHETIC_HALF_SPREAD),
        )))
    }
}
