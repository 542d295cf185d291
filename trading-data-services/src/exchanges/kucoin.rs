use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use trading_core::{now_ms, CanonicalSymbol, MarketType, TimestampMS};

use crate::feeds::adapter::{parse_json, DecodeError, RawQuote, StreamAdapter};
use crate::feeds::error::FeedError;
use crate::feeds::http::HttpFetcher;
use crate::feeds::json::{price_at, str_at, timestamp_at};

const BULLET_PATH: &str = "/api/v1/bullet-public";

/// Some networks block one or two of these
const SPOT_HOSTS: &[&str] = &[
    "https://api.kucoin.com",
    "https://openapi-v2.kucoin.com",
    "https://api1.kucoin.com",
];
const FUTURES_HOSTS: &[&str] = &[
    "https://api-futures.kucoin.com",
    "https://futures-api.kucoin.com",
];

/// Topic subscriptions are capped at 100 instruments
const TOPICS_PER_CONNECTION: usize = 100;

pub const RECONNECT_DELAY: Duration = Duration::from_millis(1500);
pub const PING_INTERVAL: Duration = Duration::from_secs(20);

/// KuCoin websocket behind a `bullet-public` token.
///
/// Every connection first asks a REST host for an instance server and a
/// token; hosts are tried in order until one answers.
pub struct KucoinStream {
    market: MarketType,
}

impl KucoinStream {
    pub fn spot() -> Self {
        Self {
            market: MarketType::Spot,
        }
    }

    pub fn futures() -> Self {
        Self {
            market: MarketType::Futures,
        }
    }

    fn hosts(&self) -> &'static [&'static str] {
        match self.market {
            MarketType::Spot => SPOT_HOSTS,
            MarketType::Futures => FUTURES_HOSTS,
        }
    }

    fn topic_prefix(&self) -> &'static str {
        match self.market {
            MarketType::Spot => "/market/ticker:",
            MarketType::Futures => "/contractMarket/tickerV2:",
        }
    }
}

/// Extract `{endpoint}?token=..` from a bullet-public response
fn bullet_url(body: &Value) -> Option<String> {
    let data = body.get("data")?;
    let token = str_at(data, &["token"])?;
    let endpoint = data
        .get("instanceServers")?
        .as_array()?
        .iter()
        .find_map(|server| str_at(server, &["endpoint"]))?;
    Some(format!("{}?token={}&connectId={}", endpoint, token, now_ms()))
}

#[async_trait]
impl StreamAdapter for KucoinStream {
    fn exchange(&self) -> &'static str {
        "kucoin"
    }

    fn market_type(&self) -> MarketType {
        self.market
    }

    fn max_instruments_per_connection(&self) -> Option<usize> {
        Some(TOPICS_PER_CONNECTION)
    }

    fn instrument(&self, symbol: &CanonicalSymbol) -> Option<String> {
        match self.market {
            MarketType::Spot => Some(symbol.to_string()),
            MarketType::Futures => {
                if symbol.quote() != "USDT" {
                    return None;
                }
                let base = match symbol.base() {
                    "BTC" => "XBT",
                    other => other,
                };
                Some(format!("{}USDTM", base))
            }
        }
    }

    async fn endpoint(
        &self,
        _attempt: u32,
        _instruments: &[String],
        http: &dyn HttpFetcher,
    ) -> Result<String, FeedError> {
        let mut failures = Vec::new();
        for host in self.hosts() {
            let url = format!("{}{}", host, BULLET_PATH);
            match http.post_json(&url, &json!({})).await {
                Ok(body) => match bullet_url(&body) {
                    Some(ws) => return Ok(ws),
                    None => failures.push(format!("{}: bad bullet-public payload", host)),
                },
                Err(e) => {
                    tracing::warn!(exchange = "kucoin", host, "Bullet request failed: {}", e);
                    failures.push(format!("{}: {}", host, e));
                }
            }
        }
        Err(FeedError::Endpoint(failures.join("; ")))
    }

    fn subscribe_messages(&self, instruments: &[String]) -> Vec<String> {
        vec![json!({
            "id": now_ms().to_string(),
            "type": "subscribe",
            "topic": format!("{}{}", self.topic_prefix(), instruments.join(",")),
            "privateChannel": false,
            "response": true,
        })
        .to_string()]
    }

    fn ping_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn ping_message(&self, now: TimestampMS) -> Option<String> {
        Some(json!({"id": now.to_string(), "type": "ping"}).to_string())
    }

    fn decode(&self, text: &str) -> Result<Option<RawQuote>, DecodeError> {
        let msg = parse_json(text)?;
        match msg.get("type").and_then(Value::as_str) {
            Some("message") => {}
            Some("error") => {
                let reason = str_at(&msg, &["data", "msg"]).unwrap_or("unknown");
                return Err(DecodeError::Upstream(reason.to_string()));
            }
            // welcome, ack, pong
            _ => return Ok(None),
        }

        let Some(symbol) = msg
            .get("topic")
            .and_then(Value::as_str)
            .and_then(|topic| topic.strip_prefix(self.topic_prefix()))
        else {
            return Ok(None);
        };
        let data = msg.get("data").ok_or(DecodeError::Missing("data"))?;

        let (bid, ask) = match self.market {
            MarketType::Spot => (
                price_at(data, &["bestBid"]).ok_or(DecodeError::BadPrice("bestBid"))?,
                price_at(data, &["bestAsk"]).ok_or(DecodeError::BadPrice("bestAsk"))?,
            ),
            MarketType::Futures => (
                price_at(data, &["bestBidPrice", "bestBid"])
                    .ok_or(DecodeError::BadPrice("bestBidPrice"))?,
                price_at(data, &["bestAskPrice", "bestAsk"])
                    .ok_or(DecodeError::BadPrice("bestAskPrice"))?,
            ),
        };

        // Futures `ts` is in nanoseconds
        let ts = match self.market {
            MarketType::Spot => timestamp_at(data, &["time"]),
            MarketType::Futures => timestamp_at(data, &["ts"]).map(|ns| ns / 1_000_000),
        };

        Ok(Some(RawQuote::new(symbol, bid, ask).at(ts)))
    }
}
