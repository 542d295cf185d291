use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Limit out of range: {requested} (max {max})")]
    LimitOutOfRange { requested: usize, max: usize },
}

impl RpcError {
    /// Get the JSON-RPC error code for this error
    pub fn code(&self) -> i32 {
        use crate::protocol::*;
        match self {
            RpcError::ParseError(_) => PARSE_ERROR,
            RpcError::InvalidRequest(_) => INVALID_REQUEST,
            RpcError::MethodNotFound(_) => METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => INVALID_PARAMS,
            RpcError::InternalError(_) => INTERNAL_ERROR,
            RpcError::SymbolNotFound(_) => SYMBOL_NOT_FOUND,
            RpcError::LimitOutOfRange { .. } => LIMIT_OUT_OF_RANGE,
        }
    }

    /// Get additional error data (optional)
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            RpcError::SymbolNotFound(symbol) => Some(serde_json::json!({
                "symbol": symbol,
                "suggestion": "Symbols appear once a feed has quoted them; check market.status"
            })),
            RpcError::LimitOutOfRange { requested, max } => Some(serde_json::json!({
                "requested": requested,
                "max": max,
            })),
            _ => None,
        }
    }
}

// Result payloads that fail to serialize are server faults
impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::InternalError(err.to_string())
    }
}
