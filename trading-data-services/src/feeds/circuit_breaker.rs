use std::collections::BTreeSet;
use trading_core::CanonicalSymbol;

/// Per-symbol kill switch for one poll worker.
///
/// A tripped symbol stays disabled until the worker is dropped. Other symbols
/// of the same worker are unaffected.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    feed: String,
    disabled: BTreeSet<CanonicalSymbol>,
}

impl CircuitBreaker {
    pub fn new(feed: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            disabled: BTreeSet::new(),
        }
    }

    pub fn is_open(&self, symbol: &CanonicalSymbol) -> bool {
        self.disabled.contains(symbol)
    }

    /// Disable `symbol`. Logs only on the first trip.
    ///
    /// # Returns
    /// `true` if the symbol was enabled before this call
    pub fn trip(&mut self, symbol: &CanonicalSymbol, reason: &str) -> bool {
        let newly = self.disabled.insert(symbol.clone());
        if newly {
            tracing::warn!(feed = %self.feed, %symbol, "Disabling symbol: {}", reason);
        }
        newly
    }

    pub fn disabled(&self) -> impl Iterator<Item = &CanonicalSymbol> {
        self.disabled.iter()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }
}
