use serde::{Deserialize, Serialize};
use serde_json::Value;
use trading_core::{Snapshot, SpreadOpportunity, TimestampMS};
use trading_data_services::FeedStatus;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 Success Response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub result: Value,
}

/// JSON-RPC 2.0 Error Response
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub error: ErrorObject,
}

/// JSON-RPC Error Object
#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Either reply shape, serialized without a wrapper
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    Success(JsonRpcResponse),
    Failure(JsonRpcError),
}

/// JSON-RPC 2.0 Notification pushed to subscribers
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<T> {
    pub jsonrpc: String,
    pub method: String,
    pub params: T,
}

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Custom error codes for market queries
pub const SYMBOL_NOT_FOUND: i32 = -32001;
pub const LIMIT_OUT_OF_RANGE: i32 = -32002;

/// market.snapshot parameters
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotParams {
    /// Restrict the snapshot and spreads to one canonical symbol
    #[serde(default)]
    pub symbol: Option<String>,
}

/// market.spreads / market.basis parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// market.status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    /// Started integrations, e.g. "bybit-spot(poller)"
    pub exchanges: Vec<String>,
    pub feeds: Vec<FeedStatus>,
    pub active: usize,
    pub updated: TimestampMS,
}

/// market.snapshot response
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub data: Value,
    pub spreads: Vec<SpreadOpportunity>,
}

/// market.subscribe acknowledgement
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub msg: String,
    pub interval_ms: u64,
}

/// market.update notification payload
#[derive(Debug, Serialize)]
pub struct MarketUpdate {
    pub snapshot: Snapshot,
    pub spreads: Vec<SpreadOpportunity>,
    pub ts: TimestampMS,
}
