//! JSON-RPC surface exercised over the line-delimited serve loop

use agrama::{Agrama, AgramaConfig};
use serde_json::{json, Value as Json};

fn db() -> Agrama {
    Agrama::new(AgramaConfig::default()).unwrap()
}

/// Run a scripted conversation and return the parsed response lines
fn converse(db: &Agrama, lines: &[String]) -> Vec<Json> {
    let input = lines.join("\n") + "\n";
    let mut output = Vec::new();
    db.serve(input.as_bytes(), &mut output).unwrap();
    std::str::from_utf8(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn full_handshake_and_tool_call() {
    let db = db();
    let responses = converse(
        &db,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "pair-agent", "version": "0.1"},
                }
            })
            .to_string(),
            json!({"jsonrpc": "2.0", "method": "initialized"}).to_string(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "store", "arguments": {"key": "note", "value": "remember this"}}
            })
            .to_string(),
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "retrieve", "arguments": {"key": "note"}}
            })
            .to_string(),
        ],
    );

    // initialized is a notification: 4 responses for 5 messages
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "agrama");

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert!(tools.len() >= 5);

    assert_eq!(responses[2]["result"]["isError"], false);

    let retrieved: Json = serde_json::from_str(
        responses[3]["result"]["content"][0]["text"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(retrieved["value"], "remember this");
    // The connection's clientInfo name is the agent identity
    assert_eq!(retrieved["metadata"]["agent_id"], "pair-agent");
}

#[test]
fn read_your_writes_within_session() {
    let db = db();
    let responses = converse(
        &db,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "store", "arguments": {"key": "ryw", "value": "v1", "agent_id": "w"}}
            })
            .to_string(),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "retrieve", "arguments": {"key": "ryw", "agent_id": "w"}}
            })
            .to_string(),
        ],
    );
    let retrieved: Json = serde_json::from_str(
        responses[1]["result"]["content"][0]["text"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(retrieved["exists"], true);
    assert_eq!(retrieved["value"], "v1");
}

#[test]
fn cross_agent_visibility_after_store() {
    let db = db();
    db.execute("writer", "store", &json!({"key": "shared", "value": "published"}))
        .unwrap();
    let got = db
        .execute("reader", "retrieve", &json!({"key": "shared"}))
        .unwrap();
    assert_eq!(got["value"], "published");
}

#[test]
fn error_envelope_codes_on_the_wire() {
    let db = db();
    let responses = converse(
        &db,
        &[
            // Unknown method
            json!({"jsonrpc": "2.0", "id": 1, "method": "explode"}).to_string(),
            // Invalid params shape
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {}}).to_string(),
            // Domain validation error: traversal key
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "store", "arguments": {"key": "../x", "value": "v"}}
            })
            .to_string(),
            // Domain not-found error surfaces as exists=false, not an error
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "retrieve", "arguments": {"key": "missing"}}
            })
            .to_string(),
        ],
    );
    assert_eq!(responses[0]["error"]["code"], -32601);
    assert_eq!(responses[1]["error"]["code"], -32602);
    assert_eq!(responses[2]["error"]["code"], -32602);
    let retrieved: Json = serde_json::from_str(
        responses[3]["result"]["content"][0]["text"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(retrieved["exists"], false);
}

#[test]
fn oversize_message_rejected_but_connection_survives() {
    let db = db();
    let huge_value = "x".repeat(11 * 1024 * 1024);
    let responses = converse(
        &db,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "store", "arguments": {"key": "big", "value": huge_value}}
            })
            .to_string(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
        ],
    );
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[0]["id"], Json::Null);
    assert!(responses[1]["result"]["tools"].is_array());
}

#[test]
fn value_over_limit_is_domain_error() {
    let mut config = AgramaConfig::default();
    config.limits.max_value_bytes = 8;
    let db = Agrama::new(config).unwrap();

    let err = db
        .execute("a", "store", &json!({"key": "k", "value": "way too long for the limit"}))
        .unwrap_err();
    assert_eq!(err.json_rpc_code(), -32602);
    assert!(err.to_string().contains("value too large"));

    // The store is untouched
    let got = db.execute("a", "retrieve", &json!({"key": "k"})).unwrap();
    assert_eq!(got["exists"], false);
}
