use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trading_core::{CanonicalSymbol, MarketType, QuoteStore};

use crate::exchanges::build_feeds;
use crate::feeds::adapter::{FeedAdapter, FeedId, FeedSpec};
use crate::feeds::config::FeedsConfig;
use crate::feeds::http::HttpFetcher;
use crate::feeds::poll_worker::PollWorker;
use crate::feeds::stream_worker::StreamWorker;

/// Connection state of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Active,
}

/// Point-in-time view of one worker for status queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub id: String,
    pub label: String,
    pub exchange: String,
    pub market_type: MarketType,
    pub state: FeedState,
}

#[derive(Clone)]
struct StatusEntry {
    id: FeedId,
    exchange: &'static str,
    market_type: MarketType,
    state: watch::Receiver<FeedState>,
}

impl StatusEntry {
    fn status(&self) -> FeedStatus {
        FeedStatus {
            id: self.id.to_string(),
            label: self.id.name.label(),
            exchange: self.exchange.to_string(),
            market_type: self.market_type,
            state: *self.state.borrow(),
        }
    }
}

/// Read-only view of worker states, cheap to clone into request handlers
#[derive(Clone, Default)]
pub struct FeedBoard {
    entries: Vec<StatusEntry>,
}

impl FeedBoard {
    pub fn statuses(&self) -> Vec<FeedStatus> {
        self.entries.iter().map(StatusEntry::status).collect()
    }

    /// Labels of the integrations that were started, one per feed
    pub fn labels(&self) -> Vec<String> {
        let mut names = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.id.name) {
                names.push(entry.id.name);
            }
        }
        names.iter().map(|n| n.label()).collect()
    }

    /// Workers currently connected (streams) or answering (pollers)
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| *e.state.borrow() == FeedState::Active)
            .count()
    }
}

struct WorkerHandle {
    entry: StatusEntry,
    task: JoinHandle<()>,
}

/// Spawns and owns every feed worker.
///
/// Each worker is an independent task; a failing or slow venue only affects
/// its own task. All of them share the [`QuoteStore`] handle and stop on the
/// same cancellation token.
pub struct FeedSupervisor {
    store: Arc<QuoteStore>,
    http: Arc<dyn HttpFetcher>,
    cancel: CancellationToken,
    workers: Vec<WorkerHandle>,
}

impl FeedSupervisor {
    pub fn new(store: Arc<QuoteStore>, http: Arc<dyn HttpFetcher>) -> Self {
        Self {
            store,
            http,
            cancel: CancellationToken::new(),
            workers: Vec::new(),
        }
    }

    /// Build every configured integration and spawn its workers.
    ///
    /// # Arguments
    /// * `config` - Feeds to run and the symbols they track
    /// * `store` - Shared quote store every worker writes to
    /// * `http` - REST transport for pollers and endpoint lookups
    pub fn start(config: &FeedsConfig, store: Arc<QuoteStore>, http: Arc<dyn HttpFetcher>) -> Self {
        let mut supervisor = Self::new(store, http);
        for spec in build_feeds(config) {
            let name = spec.name;
            let spawned = supervisor.spawn(spec, &config.symbols);
            tracing::info!(feed = %name, workers = spawned, "Feed started");
        }
        supervisor
    }

    /// Stop handle shared by every worker
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the workers for one integration.
    ///
    /// Stream feeds get one worker per connection shard; pollers get one
    /// worker for all symbols.
    ///
    /// # Returns
    /// Number of workers spawned
    pub fn spawn(&mut self, spec: FeedSpec, symbols: &[CanonicalSymbol]) -> usize {
        match &spec.adapter {
            FeedAdapter::Stream(adapter) => {
                let mut seen = BTreeSet::new();
                let instruments: Vec<String> = symbols
                    .iter()
                    .filter_map(|s| adapter.instrument(s))
                    .filter(|i| seen.insert(i.clone()))
                    .collect();
                if instruments.is_empty() {
                    tracing::warn!(feed = %spec.name, "No tracked symbols listed, not starting");
                    return 0;
                }

                let shard_size = adapter
                    .max_instruments_per_connection()
                    .unwrap_or(instruments.len())
                    .max(1);

                let mut spawned = 0;
                for (shard, chunk) in instruments.chunks(shard_size).enumerate() {
                    let id = FeedId::new(spec.name, shard);
                    let (tx, rx) = watch::channel(FeedState::Disconnected);
                    let worker = StreamWorker::new(
                        id.clone(),
                        Arc::clone(adapter),
                        chunk.to_vec(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.http),
                        spec.settings.clone(),
                        tx,
                    );
                    let task = tokio::spawn(worker.run(self.cancel.child_token()));
                    self.track(id, &spec.adapter, rx, task);
                    spawned += 1;
                }
                spawned
            }
            FeedAdapter::Poll(adapter) => {
                let id = FeedId::new(spec.name, 0);
                let (tx, rx) = watch::channel(FeedState::Disconnected);
                let worker = PollWorker::new(
                    id.clone(),
                    Arc::clone(adapter),
                    symbols.to_vec(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.http),
                    spec.settings.clone(),
                    tx,
                );
                let task = tokio::spawn(worker.run(self.cancel.child_token()));
                self.track(id, &spec.adapter, rx, task);
                1
            }
        }
    }

    fn track(
        &mut self,
        id: FeedId,
        adapter: &FeedAdapter,
        state: watch::Receiver<FeedState>,
        task: JoinHandle<()>,
    ) {
        self.workers.push(WorkerHandle {
            entry: StatusEntry {
                id,
                exchange: adapter.exchange(),
                market_type: adapter.market_type(),
                state,
            },
            task,
        });
    }

    /// Snapshot of the current workers' status channels
    pub fn board(&self) -> FeedBoard {
        FeedBoard {
            entries: self.workers.iter().map(|w| w.entry.clone()).collect(),
        }
    }

    pub fn statuses(&self) -> Vec<FeedStatus> {
        self.board().statuses()
    }

    pub fn labels(&self) -> Vec<String> {
        self.board().labels()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Cancel every worker and wait for them to finish
    pub async fn shutdown(self) {
        tracing::info!("Stopping {} feed workers", self.workers.len());
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.task.await {
                tracing::error!(feed = %worker.entry.id, "Worker task failed: {}", e);
            }
        }
    }
}
