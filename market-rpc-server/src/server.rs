use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use trading_core::{QuoteStore, SpreadEngine};
use trading_data_services::{FeedSupervisor, HttpFetcher, ReqwestFetcher};

use crate::broadcaster::{Broadcaster, UPDATE_BUFFER};
use crate::config::ServerConfig;
use crate::error::RpcError;
use crate::handler::MarketQueryHandler;
use crate::protocol::*;

/// Longest request line accepted from a client
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// JSON-RPC server for market queries and update subscriptions
pub struct RpcServer {
    config: ServerConfig,
    supervisor: FeedSupervisor,
    broadcaster: Arc<Broadcaster>,
    handler: Arc<MarketQueryHandler>,
}

impl RpcServer {
    /// Create the store, start every configured feed and wire the handlers
    pub fn new(config: ServerConfig) -> Result<Self> {
        tracing::info!("Initializing market components...");

        let store = Arc::new(QuoteStore::with_policy(config.upsert_policy));
        let http: Arc<dyn HttpFetcher> = Arc::new(
            ReqwestFetcher::new(config.http_timeout).context("Failed to build HTTP client")?,
        );

        let supervisor = FeedSupervisor::start(&config.feeds, Arc::clone(&store), http);
        let engine = SpreadEngine::default();
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&store),
            engine,
            config.broadcast_interval,
            UPDATE_BUFFER,
        ));
        let handler = Arc::new(
            MarketQueryHandler::new(store, engine, supervisor.board())
                .with_broadcast_interval(config.broadcast_interval),
        );

        tracing::info!(
            "✅ {} feed workers started for {} symbols",
            supervisor.worker_count(),
            config.feeds.symbols.len()
        );

        Ok(Self {
            config,
            supervisor,
            broadcaster,
            handler,
        })
    }

    /// Serve connections until Ctrl-C, then stop the broadcaster and feeds
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;

        tracing::info!("✅ Market JSON-RPC Server listening on {}", addr);
        tracing::info!("Ready to accept connections");

        let cancel = self.supervisor.cancel_token();
        let broadcast_task = tokio::spawn(Arc::clone(&self.broadcaster).run(cancel.clone()));

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        tracing::debug!("New connection from {}", addr);
                        let handler = Arc::clone(&self.handler);
                        let broadcaster = Arc::clone(&self.broadcaster);
                        let cancel = cancel.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, handler, broadcaster, cancel).await {
                                tracing::error!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.supervisor.shutdown().await;
        if let Err(e) = broadcast_task.await {
            tracing::warn!("Broadcaster task ended abnormally: {}", e);
        }

        tracing::info!("✅ Server stopped");
        Ok(())
    }
}

/// Handle a single TCP connection.
///
/// Requests are answered in order. After `market.subscribe` the connection
/// also receives every `market.update` frame; a subscriber that falls behind
/// skips the frames it missed.
async fn handle_connection(
    socket: TcpStream,
    handler: Arc<MarketQueryHandler>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
) -> Result<()> {
    let (mut sink, mut lines) =
        Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)).split();
    let mut updates: Option<broadcast::Receiver<Arc<str>>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next() => {
                let Some(line) = line else {
                    // Connection closed
                    break;
                };
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }

                tracing::debug!("Received request: {}", line.trim());

                let (response, subscribe) = process_request(&line, &handler);
                if subscribe && updates.is_none() {
                    updates = Some(broadcaster.subscribe());
                    tracing::debug!(subscribers = broadcaster.subscriber_count(), "Client subscribed");
                }

                sink.send(serde_json::to_string(&response)?).await?;
                tracing::debug!("Sent response");
            }
            frame = next_update(&mut updates) => match frame {
                Some(frame) => sink.send(frame.to_string()).await?,
                None => updates = None,
            },
        }
    }

    Ok(())
}

/// Next frame for a subscribed connection; pending forever otherwise.
///
/// Returns `None` once the broadcaster is gone.
async fn next_update(updates: &mut Option<broadcast::Receiver<Arc<str>>>) -> Option<Arc<str>> {
    let Some(rx) = updates.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Subscriber lagging, skipping updates");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Process a JSON-RPC request.
///
/// # Returns
/// The reply and whether the caller asked to receive updates
fn process_request(line: &str, handler: &MarketQueryHandler) -> (JsonRpcReply, bool) {
    // Parse JSON-RPC request
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            return (
                create_error_response(None, RpcError::ParseError(e.to_string())),
                false,
            );
        }
    };

    // Validate JSON-RPC version
    if request.jsonrpc != JSONRPC_VERSION {
        return (
            create_error_response(
                request.id,
                RpcError::InvalidRequest("JSON-RPC version must be 2.0".to_string()),
            ),
            false,
        );
    }

    let JsonRpcRequest { id, method, params, .. } = request;

    // Route to method handler
    let result = match method.as_str() {
        "market.status" => to_result(Ok(handler.status())),
        "market.snapshot" => parse_params(params).and_then(|p| to_result(handler.snapshot(p))),
        "market.spreads" => parse_params(params).and_then(|p| to_result(handler.spreads(p))),
        "market.basis" => parse_params(params).and_then(|p| to_result(handler.basis(p))),
        "market.subscribe" => {
            return (create_success_response(id, to_result(Ok(handler.hello()))), true);
        }
        _ => Err(RpcError::MethodNotFound(method.clone())),
    };

    (create_success_response(id, result), false)
}

/// Absent params mean defaults; present params must match the method's shape
fn parse_params<T>(params: Option<Value>) -> Result<T, RpcError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => serde_json::from_value(params)
            .map_err(|e| RpcError::InvalidParams(format!("Invalid params: {}", e))),
    }
}

fn to_result<T: serde::Serialize>(result: Result<T, RpcError>) -> Result<Value, RpcError> {
    Ok(serde_json::to_value(result?)?)
}

fn create_success_response(id: Option<Value>, result: Result<Value, RpcError>) -> JsonRpcReply {
    match result {
        Ok(result) => JsonRpcReply::Success(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }),
        Err(e) => create_error_response(id, e),
    }
}

/// Create an error response
fn create_error_response(id: Option<Value>, error: RpcError) -> JsonRpcReply {
    JsonRpcReply::Failure(JsonRpcError {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        error: ErrorObject {
            code: error.code(),
            message: error.to_string(),
            data: error.data(),
        },
    })
}
