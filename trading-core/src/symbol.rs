use crate::types::{CanonicalSymbol, MarketType};

/// Quote currencies recognised as a suffix of concatenated symbols.
/// Ordered longest first so that `USDT` wins over `USD`.
const KNOWN_QUOTES: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD", "EUR", "GBP", "TRY", "BRL",
];

/// Exchange-specific symbols that cannot be derived by the generic rules.
/// Keyed by exchange family (`kraken` covers `kraken-futures`).
const MANUAL_OVERRIDES: &[(&str, &str, &str)] = &[
    ("kraken", "PI_XBTUSD", "BTC-USD"),
    ("kraken", "PF_XBTUSD", "BTC-USD"),
    ("kraken", "PI_ETHUSD", "ETH-USD"),
    ("kraken", "PF_ETHUSD", "ETH-USD"),
];

/// Legacy tickers some venues still use for the base asset
const BASE_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

/// Suffixes wrapping a spot pair into a derivative instrument name
const WRAPPER_SUFFIXES: &[&str] = &["-SWAP"];

/// Map an exchange-native symbol to canonical `BASE-QUOTE` form.
///
/// Rules are applied in order and the first match wins:
/// 1. Remove whitespace, uppercase, turn `/` and `_` into `-`
/// 2. Manual override table for the exchange family
/// 3. Strip derivative wrappers (`-SWAP`, trailing `M` on margined futures)
/// 4. Split on `-` when there are exactly two segments
/// 5. Split concatenated symbols on a known quote suffix
/// 6. Apply base aliases (`XBT` -> `BTC`)
/// 7. Otherwise return the unified input unchanged
///
/// Returns `None` only for empty input. The fallback output is not guaranteed
/// to be a valid [`CanonicalSymbol`]; use [`normalize_canonical`] for that.
pub fn normalize(exchange: &str, raw: &str, market: MarketType) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.is_empty() {
        return None;
    }
    let unified = unify(&compact);

    if let Some(hit) = manual_override(exchange, &unified) {
        return Some(hit.to_string());
    }

    let stripped = strip_wrappers(&unified, market);

    let split = if stripped.contains('-') {
        match stripped.split_once('-') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('-') =>
            {
                Some((base, quote))
            }
            _ => None,
        }
    } else {
        split_on_quote(stripped)
    };

    match split {
        Some((base, quote)) => Some(format!("{}-{}", alias_base(base), quote)),
        None => Some(unified),
    }
}

/// [`normalize`] followed by validation of the result
pub fn normalize_canonical(
    exchange: &str,
    raw: &str,
    market: MarketType,
) -> Option<CanonicalSymbol> {
    normalize(exchange, raw, market).and_then(|s| CanonicalSymbol::parse(&s).ok())
}

/// Exchange family used for override lookups ("kraken-futures" -> "kraken")
pub fn exchange_family(exchange: &str) -> String {
    exchange
        .split(['-', '_', ':'])
        .next()
        .unwrap_or(exchange)
        .trim()
        .to_ascii_lowercase()
}

/// Reverse lookup of the override table: native instruments of an exchange
/// family that map to `symbol`
pub fn override_instruments(exchange: &str, symbol: &CanonicalSymbol) -> Vec<&'static str> {
    let family = exchange_family(exchange);
    MANUAL_OVERRIDES
        .iter()
        .filter(|(ex, _, canonical)| *ex == family && *canonical == symbol.as_str())
        .map(|(_, raw, _)| *raw)
        .collect()
}

fn unify(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '_' => '-',
            c => c,
        })
        .collect()
}

fn manual_override(exchange: &str, unified: &str) -> Option<&'static str> {
    let family = exchange_family(exchange);
    MANUAL_OVERRIDES
        .iter()
        .find(|(ex, raw, _)| *ex == family && unify(raw) == unified)
        .map(|(_, _, canonical)| *canonical)
}

fn strip_wrappers(symbol: &str, market: MarketType) -> &str {
    for suffix in WRAPPER_SUFFIXES {
        if let Some(stripped) = symbol.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }

    // Margined-futures marker on concatenated symbols: XBTUSDTM -> XBTUSDT
    if market == MarketType::Futures && !symbol.contains('-') {
        if let Some(stripped) = symbol.strip_suffix('M') {
            if split_on_quote(stripped).is_some() {
                return stripped;
            }
        }
    }

    symbol
}

fn split_on_quote(symbol: &str) -> Option<(&str, &str)> {
    KNOWN_QUOTES.iter().find_map(|quote| {
        symbol
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *quote))
    })
}

fn alias_base(base: &str) -> &str {
    BASE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == base)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(exchange: &str, raw: &str, market: MarketType) -> String {
        normalize(exchange, raw, market).unwrap()
    }

    #[test]
    fn test_concatenated_spot_symbols() {
        assert_eq!(norm("binance", "BTCUSDT", MarketType::Spot), "BTC-USDT");
        assert_eq!(norm("binance", "ethusdc", MarketType::Spot), "ETH-USDC");
        assert_eq!(norm("binance", "BTCFDUSD", MarketType::Spot), "BTC-FDUSD");
        assert_eq!(norm("binance", "USDTBRL", MarketType::Spot), "USDT-BRL");
        assert_eq!(norm("mexc", "USDCUSDT", MarketType::Spot), "USDC-USDT");
    }

    #[test]
    fn test_base_aliases() {
        assert_eq!(norm("kraken", "XBTUSDT", MarketType::Spot), "BTC-USDT");
        assert_eq!(norm("kraken", "XBT/USD", MarketType::Spot), "BTC-USD");
        assert_eq!(norm("kraken", "XDGUSDT", MarketType::Spot), "DOGE-USDT");
    }

    #[test]
    fn test_separators_and_wrappers() {
        assert_eq!(norm("okx", "BTC-USDT-SWAP", MarketType::Futures), "BTC-USDT");
        assert_eq!(norm("gate", "BTC_USDT", MarketType::Futures), "BTC-USDT");
        assert_eq!(norm("coinbase", " btc-usd ", MarketType::Spot), "BTC-USD");
        assert_eq!(norm("kucoin", "XBTUSDTM", MarketType::Futures), "BTC-USDT");
        assert_eq!(norm("kucoin", "ETHUSDTM", MarketType::Futures), "ETH-USDT");
    }

    #[test]
    fn test_trailing_m_kept_on_spot() {
        // Base ending in M stays intact outside futures
        assert_eq!(norm("binance", "ATOMUSDT", MarketType::Spot), "ATOM-USDT");
        assert_eq!(norm("binance", "ATOMUSDT", MarketType::Futures), "ATOM-USDT");
    }

    #[test]
    fn test_manual_override() {
        assert_eq!(norm("kraken-futures", "PI_XBTUSD", MarketType::Futures), "BTC-USD");
        assert_eq!(norm("kraken", "pi_ethusd", MarketType::Futures), "ETH-USD");
        // Override is scoped to its exchange family
        assert_ne!(norm("binance", "PI_XBTUSD", MarketType::Futures), "BTC-USD");
    }

    #[test]
    fn test_fallback_is_uppercased_input() {
        assert_eq!(norm("binance", "ethbtc", MarketType::Spot), "ETHBTC");
        assert_eq!(norm("okx", "A-B-C", MarketType::Spot), "A-B-C");
        assert!(normalize_canonical("binance", "ethbtc", MarketType::Spot).is_none());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize("binance", "", MarketType::Spot), None);
        assert_eq!(normalize("binance", "   ", MarketType::Spot), None);
    }

    #[test]
    fn test_canonical_inputs_are_fixed_points() {
        for s in ["BTC-USDT", "ETH-USD", "ATOM-USDT", "1000PEPE-USDT", "USDC-USDT", "DOGE-BRL"] {
            for market in [MarketType::Spot, MarketType::Futures] {
                assert_eq!(norm("binance", s, market), s);
                let once = norm("okx", s, market);
                assert_eq!(norm("okx", &once, market), once);
            }
        }
    }

    #[test]
    fn test_override_reverse_lookup() {
        let btc_usd = CanonicalSymbol::parse("BTC-USD").unwrap();
        let found = override_instruments("kraken-futures", &btc_usd);
        assert!(found.contains(&"PI_XBTUSD"));
        assert!(override_instruments("binance", &btc_usd).is_empty());
    }
}
