use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use trading_core::{normalize_canonical, now_ms, CanonicalSymbol, Quote, QuoteStore};

use crate::feeds::adapter::{DecodeError, FeedId, PollAdapter, RawQuote};
use crate::feeds::circuit_breaker::CircuitBreaker;
use crate::feeds::config::FeedSettings;
use crate::feeds::dedup_log::DedupLog;
use crate::feeds::http::{FailureClass, FetchError, HttpFetcher};
use crate::feeds::supervisor::FeedState;

/// What one poll cycle achieved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Requests sent, batch included
    pub requests: usize,
    /// Requests that returned a usable HTTP response
    pub responses: usize,
    pub upserts: usize,
    pub batch_served: bool,
    pub newly_disabled: Vec<CanonicalSymbol>,
}

enum Attempt {
    Quoted,
    /// Answered, but without a usable quote
    Empty,
    Rejected(String),
    Transient,
}

/// Drives one [`PollAdapter`]: batch first, then per-symbol requests behind
/// the circuit breaker and politeness throttle.
pub struct PollWorker {
    id: FeedId,
    adapter: Arc<dyn PollAdapter>,
    symbols: Vec<CanonicalSymbol>,
    store: Arc<QuoteStore>,
    http: Arc<dyn HttpFetcher>,
    settings: FeedSettings,
    throttle: Option<DefaultDirectRateLimiter>,
    breaker: CircuitBreaker,
    log: DedupLog,
    state: watch::Sender<FeedState>,
}

impl PollWorker {
    pub fn new(
        id: FeedId,
        adapter: Arc<dyn PollAdapter>,
        symbols: Vec<CanonicalSymbol>,
        store: Arc<QuoteStore>,
        http: Arc<dyn HttpFetcher>,
        settings: FeedSettings,
        state: watch::Sender<FeedState>,
    ) -> Self {
        // Quota::with_period is None for a zero period: no throttling
        let throttle = Quota::with_period(settings.politeness).map(RateLimiter::direct);

        Self {
            breaker: CircuitBreaker::new(id.to_string()),
            log: DedupLog::new(id.to_string()),
            id,
            adapter,
            symbols,
            store,
            http,
            settings,
            throttle,
            state,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Distinct conditions warned about so far
    pub fn logged_conditions(&self) -> usize {
        self.log.len()
    }

    /// Poll until cancelled. Cycles never overlap: the interval starts after
    /// the previous cycle finishes.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            feed = %self.id,
            "Starting poller for {} symbols every {:?}",
            self.symbols.len(),
            self.settings.poll_interval
        );
        self.state.send_replace(FeedState::Connecting);
        let mut failures: u32 = 0;

        loop {
            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                report = self.run_cycle() => report,
            };

            // Nothing left to ask for (every symbol tripped) is idle, not down
            let pause = if report.responses > 0 || report.requests == 0 {
                failures = 0;
                self.state.send_replace(FeedState::Active);
                self.settings.poll_interval
            } else {
                failures = failures.saturating_add(1);
                self.state.send_replace(FeedState::Disconnected);
                self.settings.backoff.delay(failures)
            };

            tracing::debug!(
                feed = %self.id,
                requests = report.requests,
                upserts = report.upserts,
                "Poll cycle complete"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.state.send_replace(FeedState::Disconnected);
        tracing::info!(feed = %self.id, "Poller stopped");
    }

    /// Run one full pass over the tracked symbols
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(url) = self.adapter.batch_url() {
            report.requests += 1;
            match self.fetch(&url).await {
                Ok(body) => {
                    report.responses += 1;
                    match self.adapter.decode_batch(&body) {
                        Ok(rows) => {
                            report.upserts += self.ingest_batch(rows);
                            report.batch_served = true;
                            return report;
                        }
                        Err(e) => {
                            self.log.warn(
                                format!("batch:{}", e.condition()),
                                format_args!("Batch response unusable, falling back: {}", e),
                            );
                        }
                    }
                }
                Err(e) => {
                    self.log.warn(
                        format!("batch:{}", e.condition()),
                        format_args!("Batch request failed, falling back: {}", e),
                    );
                }
            }
        }

        let symbols = self.symbols.clone();
        for symbol in &symbols {
            if self.breaker.is_open(symbol) {
                continue;
            }
            let urls = self.adapter.symbol_urls(symbol);
            if urls.is_empty() {
                continue;
            }

            let mut rejections = Vec::new();
            let mut settled = false;
            for url in &urls {
                if let Some(throttle) = &self.throttle {
                    throttle.until_ready().await;
                }
                report.requests += 1;

                match self.attempt(symbol, url).await {
                    Attempt::Quoted => {
                        report.responses += 1;
                        report.upserts += 1;
                        settled = true;
                    }
                    Attempt::Empty => {
                        report.responses += 1;
                        settled = true;
                    }
                    Attempt::Rejected(reason) => {
                        report.responses += 1;
                        rejections.push(reason);
                    }
                    Attempt::Transient => settled = true,
                }
                if settled {
                    break;
                }
            }

            if !settled && !rejections.is_empty() {
                let reason = rejections.join("; ");
                if self.breaker.trip(symbol, &reason) {
                    report.newly_disabled.push(symbol.clone());
                }
            }
        }

        report
    }

    async fn attempt(&mut self, symbol: &CanonicalSymbol, url: &str) -> Attempt {
        let body = match self.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                return match e.class() {
                    FailureClass::Rejected => Attempt::Rejected(e.to_string()),
                    FailureClass::Transient => {
                        self.log.warn(
                            format!("{}:{}", symbol, e.condition()),
                            format_args!("Request for {} failed: {}", symbol, e),
                        );
                        Attempt::Transient
                    }
                };
            }
        };

        match self.adapter.decode_symbol(symbol, &body) {
            Ok(Some(raw)) => {
                if self.upsert(symbol.clone(), &raw) {
                    Attempt::Quoted
                } else {
                    Attempt::Empty
                }
            }
            Ok(None) => {
                self.log.warn(
                    format!("{}:no-data", symbol),
                    format_args!("No data for {}", symbol),
                );
                Attempt::Empty
            }
            Err(DecodeError::Rejected(reason)) => Attempt::Rejected(reason),
            Err(e) => {
                self.log.warn(
                    format!("{}:{}", symbol, e.condition()),
                    format_args!("Dropping response for {}: {}", symbol, e),
                );
                Attempt::Empty
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        with_timeout(self.settings.request_timeout, self.http.get_json(url)).await
    }

    fn ingest_batch(&mut self, rows: Vec<RawQuote>) -> usize {
        let tracked: BTreeSet<CanonicalSymbol> = self.symbols.iter().cloned().collect();
        let mut seen = BTreeSet::new();
        let mut upserts = 0;

        for raw in rows {
            let Some(symbol) =
                normalize_canonical(self.adapter.exchange(), &raw.symbol, self.adapter.market_type())
            else {
                continue;
            };
            if !tracked.contains(&symbol) || self.breaker.is_open(&symbol) {
                continue;
            }
            seen.insert(symbol.clone());
            if self.upsert(symbol, &raw) {
                upserts += 1;
            }
        }

        for symbol in &tracked {
            if !seen.contains(symbol) {
                self.log.warn(
                    format!("{}:missing-from-batch", symbol),
                    format_args!("{} missing from batch", symbol),
                );
            }
        }

        upserts
    }

    fn upsert(&mut self, symbol: CanonicalSymbol, raw: &RawQuote) -> bool {
        let observed_at = raw.exchange_ts.unwrap_or_else(now_ms);
        match Quote::new(
            self.adapter.exchange(),
            self.adapter.market_type(),
            symbol,
            raw.bid,
            raw.ask,
            observed_at,
        ) {
            Ok(quote) => {
                self.store.upsert(quote);
                true
            }
            Err(e) => {
                self.log.warn(
                    format!("{}:invalid-quote", raw.symbol),
                    format_args!("Dropping quote for {}: {}", raw.symbol, e),
                );
                false
            }
        }
    }
}

async fn with_timeout<F>(limit: std::time::Duration, request: F) -> Result<Value, FetchError>
where
    F: Future<Output = Result<Value, FetchError>>,
{
    match timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    }
}
