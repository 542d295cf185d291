//! Field access helpers for loosely-typed exchange payloads.
//!
//! Venues send prices as strings or numbers and rename fields between
//! channels, so lookups take a list of candidate keys.

use serde_json::Value;
use trading_core::TimestampMS;

/// Parse a price sent as a JSON number or numeric string
pub fn price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// First candidate key holding a parsable price
pub fn price_at(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| obj.get(*key).and_then(price))
}

/// First (bid, ask) key pair where both sides parse
pub fn price_pair(obj: &Value, pairs: &[(&str, &str)]) -> Option<(f64, f64)> {
    pairs
        .iter()
        .find_map(|(bid, ask)| Some((obj.get(*bid).and_then(price)?, obj.get(*ask).and_then(price)?)))
}

pub fn str_at<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Millisecond timestamp sent as a number or numeric string
pub fn timestamp_at(obj: &Value, keys: &[&str]) -> Option<TimestampMS> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    })
}

/// `data` payloads come either as an object or as a one-element array
pub fn first_row(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(rows) => rows.first(),
        Value::Object(_) => Some(value),
        _ => None,
    }
}
