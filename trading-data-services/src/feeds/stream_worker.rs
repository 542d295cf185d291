use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use trading_core::{normalize_canonical, now_ms, Quote, QuoteStore};

use crate::feeds::adapter::{FeedId, RawQuote, StreamAdapter};
use crate::feeds::config::FeedSettings;
use crate::feeds::dedup_log::DedupLog;
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::supervisor::FeedState;

/// Owns one websocket connection for a shard of instruments and keeps it
/// alive: connect, subscribe, heartbeat, decode, reconnect after a backoff.
pub struct StreamWorker {
    id: FeedId,
    adapter: Arc<dyn StreamAdapter>,
    instruments: Vec<String>,
    store: Arc<QuoteStore>,
    http: Arc<dyn HttpFetcher>,
    settings: FeedSettings,
    state: watch::Sender<FeedState>,
    log: DedupLog,
    failures: u32,
}

impl StreamWorker {
    pub fn new(
        id: FeedId,
        adapter: Arc<dyn StreamAdapter>,
        instruments: Vec<String>,
        store: Arc<QuoteStore>,
        http: Arc<dyn HttpFetcher>,
        settings: FeedSettings,
        state: watch::Sender<FeedState>,
    ) -> Self {
        Self {
            log: DedupLog::new(id.to_string()),
            id,
            adapter,
            instruments,
            store,
            http,
            settings,
            state,
            failures: 0,
        }
    }

    /// Run the reconnect loop until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            feed = %self.id,
            "Starting stream for {} instruments",
            self.instruments.len()
        );
        let mut attempt: u32 = 0;

        loop {
            self.state.send_replace(FeedState::Connecting);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.run_connection(attempt) => result,
            };

            self.state.send_replace(FeedState::Disconnected);
            self.failures = self.failures.saturating_add(1);
            attempt = attempt.wrapping_add(1);
            let delay = self.settings.backoff.delay(self.failures);

            self.report_disconnect(&result, delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(FeedState::Disconnected);
        tracing::info!(feed = %self.id, "Stream stopped");
    }

    /// Log why a connection ended. Every attempt goes to debug; each distinct
    /// condition is warned about once.
    ///
    /// # Returns
    /// `true` if this call produced a warning
    fn report_disconnect(&mut self, result: &Result<(), FeedError>, delay: Duration) -> bool {
        match result {
            Ok(()) => {
                tracing::debug!(feed = %self.id, "Stream closed, reconnecting in {:?}", delay);
                self.log.info("reconnect:ended", "Stream closed by server, reconnecting")
            }
            Err(e) => {
                tracing::debug!(feed = %self.id, "Stream error: {}, reconnecting in {:?}", e, delay);
                self.log.warn(
                    format!("reconnect:{}", e.condition()),
                    format_args!("Stream error: {}, reconnecting with backoff", e),
                )
            }
        }
    }

    /// One connection from resolve to disconnect.
    ///
    /// # Returns
    /// `Ok(())` when the server ended the stream cleanly
    async fn run_connection(&mut self, attempt: u32) -> Result<(), FeedError> {
        let url = self
            .adapter
            .endpoint(attempt, &self.instruments, self.http.as_ref())
            .await?;

        tracing::debug!(feed = %self.id, "Connecting to {}", url);
        let (ws_stream, _response) =
            match timeout(self.settings.connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => return Err(FeedError::Connect(e.to_string())),
                Err(_) => return Err(FeedError::ConnectTimeout),
            };

        let (mut write, mut read) = ws_stream.split();

        for msg in self.adapter.subscribe_messages(&self.instruments) {
            write.send(Message::Text(msg)).await?;
        }

        self.failures = 0;
        self.state.send_replace(FeedState::Active);
        tracing::info!(feed = %self.id, "Connected and subscribed");

        let ping_every = self.adapter.ping_interval();
        let period = ping_every.unwrap_or(Duration::from_secs(3600));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => self.handle_text(&text),
                            Err(_) => {
                                self.log.warn("binary", "Ignoring non-UTF-8 binary frame");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_default();
                            return Err(FeedError::Closed(reason));
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
                _ = heartbeat.tick(), if ping_every.is_some() => {
                    if let Some(ping) = self.adapter.ping_message(now_ms()) {
                        write.send(Message::Text(ping)).await?;
                    }
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match self.adapter.decode(text) {
            Ok(Some(raw)) => self.ingest(raw),
            Ok(None) => {}
            Err(e) => {
                self.log.warn(
                    format!("decode:{}", e.condition()),
                    format_args!("Dropping malformed message: {}", e),
                );
            }
        }
    }

    fn ingest(&mut self, raw: RawQuote) {
        let exchange = self.adapter.exchange();
        let market = self.adapter.market_type();

        let Some(symbol) = normalize_canonical(exchange, &raw.symbol, market) else {
            self.log.warn(
                format!("{}:unmapped", raw.symbol),
                format_args!("Cannot map {} to a canonical symbol", raw.symbol),
            );
            return;
        };

        let observed_at = raw.exchange_ts.unwrap_or_else(now_ms);
        match Quote::new(exchange, market, symbol, raw.bid, raw.ask, observed_at) {
            Ok(quote) => {
                self.store.upsert(quote);
            }
            Err(e) => {
                self.log.warn(
                    format!("{}:invalid-quote", raw.symbol),
                    format_args!("Dropping quote for {}: {}", raw.symbol, e),
                );
            }
        }
    }
}
