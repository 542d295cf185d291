use std::collections::HashSet;
use std::fmt::Display;

/// Logs each condition once for the life of the owning worker.
///
/// Keys name the condition (e.g. `"BTC-USDT:http-403"`), not the message
/// text, so a symbol that fails the same way every cycle produces one line.
/// Keys are never expired.
#[derive(Debug, Default)]
pub struct DedupLog {
    scope: String,
    seen: HashSet<String>,
}

impl DedupLog {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            seen: HashSet::new(),
        }
    }

    /// Emit a warning the first time `key` is seen.
    ///
    /// # Returns
    /// `true` if this call logged
    pub fn warn(&mut self, key: impl Into<String>, message: impl Display) -> bool {
        if self.seen.insert(key.into()) {
            tracing::warn!(feed = %self.scope, "{}", message);
            true
        } else {
            false
        }
    }

    pub fn info(&mut self, key: impl Into<String>, message: impl Display) -> bool {
        if self.seen.insert(key.into()) {
            tracing::info!(feed = %self.scope, "{}", message);
            true
        } else {
            false
        }
    }

    pub fn has_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_once_per_key() {
        let mut log = DedupLog::new("mexc-spot-poller");
        assert!(log.warn("BTCUSDT:missing", "missing from batch: BTCUSDT"));
        assert!(!log.warn("BTCUSDT:missing", "missing from batch: BTCUSDT"));
        assert!(log.warn("ETHUSDT:missing", "missing from batch: ETHUSDT"));
        assert!(!log.info("ETHUSDT:missing", "again"));
        assert!(log.has_seen("BTCUSDT:missing"));
        assert_eq!(log.len(), 2);
    }
}
