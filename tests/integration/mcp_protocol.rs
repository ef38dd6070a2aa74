//! JSON-RPC over the newline-delimited transport.

use std::collections::HashMap;
use std::sync::Arc;

use eda_mcp::mcp::server::McpServer;
use eda_mcp::mcp::types::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use eda_mcp::transport::serve;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Duration};

use crate::common::*;

/// Feed `lines` to a server and collect every response line until it closes.
async fn exchange(env: &TestEnv, lines: &[String]) -> Vec<Value> {
    let server = Arc::new(McpServer::new(env.ctx.clone()));
    let (mut client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_out) = tokio::io::duplex(64 * 1024);

    let serving = tokio::spawn(serve(
        server,
        server_in,
        server_out,
        std::future::pending::<()>(),
    ));

    for line in lines {
        client_in.write_all(line.as_bytes()).await.unwrap();
        client_in.write_all(b"\n").await.unwrap();
    }
    drop(client_in);

    let mut responses = Vec::new();
    let mut reader = BufReader::new(client_out).lines();
    let collect = async {
        while let Some(line) = reader.next_line().await.unwrap() {
            responses.push(serde_json::from_str(&line).unwrap());
        }
    };
    timeout(Duration::from_secs(30), collect).await.unwrap();
    serving.await.unwrap().unwrap();
    responses
}

fn by_id(responses: &[Value]) -> HashMap<i64, Value> {
    responses
        .iter()
        .filter_map(|r| Some((r["id"].as_i64()?, r.clone())))
        .collect()
}

fn call(id: i64, tool: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments}
    })
    .to_string()
}

#[tokio::test]
async fn test_session_handshake_and_listing() {
    let env = TestEnv::builder().build();
    let lines = vec![
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        })
        .to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}).to_string(),
    ];

    let responses = exchange(&env, &lines).await;

    // The notification gets no response
    assert_eq!(responses.len(), 3);
    let responses = by_id(&responses);
    assert_eq!(responses[&1]["result"]["serverInfo"]["name"], "eda-mcp");
    assert_eq!(
        responses[&2]["result"]["tools"].as_array().unwrap().len(),
        6
    );
    assert_eq!(responses[&3]["result"], json!({}));
}

#[tokio::test]
async fn test_parse_error_has_null_id() {
    let env = TestEnv::builder().build();
    let lines = vec![
        "{this is not json".to_string(),
        json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}).to_string(),
    ];

    let responses = exchange(&env, &lines).await;

    assert_eq!(responses.len(), 2);
    let parse_error = responses
        .iter()
        .find(|r| r["id"].is_null())
        .expect("parse error response");
    assert_eq!(parse_error["error"]["code"], PARSE_ERROR);
    assert!(by_id(&responses).contains_key(&9));
}

#[tokio::test]
async fn test_validation_and_unknown_operation_are_protocol_errors() {
    let env = TestEnv::builder().build();
    let lines = vec![
        call(1, "simulate_verilog", json!({"verilog_code": "module m; endmodule"})),
        call(2, "read_openlane_reports", json!({})),
        call(3, "route_design", json!({})),
        json!({"jsonrpc": "2.0", "id": 4, "method": "prompts/list"}).to_string(),
    ];

    let responses = by_id(&exchange(&env, &lines).await);

    let missing_testbench = &responses[&1]["error"];
    assert_eq!(missing_testbench["code"], INVALID_PARAMS);
    let message = missing_testbench["message"].as_str().unwrap();
    assert!(message.contains("simulate_verilog"), "{}", message);
    assert!(message.contains("testbench_code"), "{}", message);

    let missing_project = responses[&2]["error"]["message"].as_str().unwrap();
    assert!(missing_project.contains("read_openlane_reports"));
    assert!(missing_project.contains("project_id"));

    assert_eq!(responses[&3]["error"]["code"], METHOD_NOT_FOUND);
    assert!(responses[&3]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("route_design"));
    assert_eq!(responses[&4]["error"]["code"], METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_tool_call_returns_envelope_text() {
    let env = TestEnv::builder().yosys(FAKE_YOSYS).build();
    let lines = vec![call(
        7,
        "synthesize_verilog",
        json!({"verilog_code": COUNTER_V, "top_module": "counter", "target": "ICE40"}),
    )];

    let responses = by_id(&exchange(&env, &lines).await);

    let result = &responses[&7]["result"];
    assert!(result.get("isError").is_none());
    assert_eq!(result["content"][0]["type"], "text");
    let envelope: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["technology"], "ICE40");
    assert_eq!(envelope["cell_count"], 42);
}

#[tokio::test]
async fn test_failed_flow_sets_is_error() {
    let env = TestEnv::builder()
        .iverilog(FAKE_IVERILOG_PORT_MISMATCH)
        .vvp(FAKE_VVP)
        .build();
    let lines = vec![call(
        5,
        "simulate_verilog",
        json!({"verilog_code": COUNTER_V, "testbench_code": COUNTER_TB}),
    )];

    let responses = by_id(&exchange(&env, &lines).await);

    let result = &responses[&5]["result"];
    assert_eq!(result["isError"], true);
    let envelope: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert!(envelope["error"]
        .as_str()
        .unwrap()
        .contains("port width mismatch"));
}

#[tokio::test]
async fn test_null_id_still_gets_a_response() {
    let env = TestEnv::builder().build();
    let lines = vec![
        json!({"jsonrpc": "2.0", "id": null, "method": "ping"}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
    ];

    let responses = exchange(&env, &lines).await;

    assert_eq!(responses.len(), 1);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[0]["result"], json!({}));
}
