/// Integration tests for the JSON-RPC server
///
/// These tests require the server running on localhost:7879 with network
/// access to the exchanges, so quotes have had a few seconds to arrive.
///
/// To run: cargo test --package market-rpc-server --test integration_test -- --ignored --nocapture
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

fn connect() -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect("127.0.0.1:7879")
        .expect("Failed to connect to server. Is it running?");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (stream, reader)
}

fn call(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, request: Value) -> Value {
    let request_json = serde_json::to_string(&request).unwrap();
    stream.write_all(request_json.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();
    stream.flush().unwrap();

    read_line(reader)
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Value {
    let mut response_line = String::new();
    reader.read_line(&mut response_line).unwrap();
    serde_json::from_str(&response_line).unwrap()
}

#[test]
#[ignore] // Requires the server running
fn test_jsonrpc_status() {
    let (mut stream, mut reader) = connect();

    let response = call(
        &mut stream,
        &mut reader,
        json!({"jsonrpc": "2.0", "id": 1, "method": "market.status"}),
    );

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    let result = &response["result"];
    assert_eq!(result["ok"], true);
    assert!(result["exchanges"].is_array());
    assert!(result["updated"].as_u64().unwrap() > 0);

    println!("Exchanges: {}", result["exchanges"]);
    println!("Active feeds: {}", result["active"]);
}

#[test]
#[ignore]
fn test_jsonrpc_snapshot() {
    let (mut stream, mut reader) = connect();

    let response = call(
        &mut stream,
        &mut reader,
        json!({"jsonrpc": "2.0", "id": 2, "method": "market.snapshot"}),
    );

    let result = &response["result"];
    assert!(result["data"].is_object());
    let spreads = result["spreads"].as_array().unwrap();
    assert!(spreads.len() <= 20);

    // Ranked largest edge first, never negative
    for pair in spreads.windows(2) {
        assert!(pair[0]["edgePct"].as_f64().unwrap() >= pair[1]["edgePct"].as_f64().unwrap());
    }
    for spread in spreads {
        assert!(spread["edgePct"].as_f64().unwrap() >= 0.0);
        assert_ne!(spread["buyFrom"], spread["sellTo"]);
    }

    println!("Symbols quoted: {}", result["data"].as_object().unwrap().len());
}

#[test]
#[ignore]
fn test_jsonrpc_subscribe() {
    let (mut stream, mut reader) = connect();

    let hello = call(
        &mut stream,
        &mut reader,
        json!({"jsonrpc": "2.0", "id": 3, "method": "market.subscribe"}),
    );
    assert_eq!(hello["result"]["msg"], "subscribed");

    let update = read_line(&mut reader);
    assert_eq!(update["method"], "market.update");
    assert!(update.get("id").is_none());
    assert!(update["params"]["snapshot"].is_object());
    assert!(update["params"]["ts"].as_u64().unwrap() > 0);
}

#[test]
#[ignore]
fn test_jsonrpc_invalid_method() {
    let (mut stream, mut reader) = connect();

    let response = call(
        &mut stream,
        &mut reader,
        json!({"jsonrpc": "2.0", "id": 4, "method": "invalid.method", "params": {}}),
    );

    assert!(response.get("error").is_some());
    assert_eq!(response["error"]["code"], -32601); // METHOD_NOT_FOUND
}

#[test]
#[ignore]
fn test_jsonrpc_unknown_symbol() {
    let (mut stream, mut reader) = connect();

    let response = call(
        &mut stream,
        &mut reader,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "market.snapshot",
            "params": {"symbol": "NOPE-USDT"}
        }),
    );

    assert_eq!(response["error"]["code"], -32001); // SYMBOL_NOT_FOUND
}
