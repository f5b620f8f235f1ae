//! Integration tests for the probe session loop.
//!
//! The session runs against an in-process fake MCP server connected through
//! `tokio::io::duplex`, with operator input supplied as a script.
//!
//! # Running
//!
//! ```bash
//! cargo test --test session_integration -- --nocapture
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use mcp_probe::ipc::{DuplexChannel, Framing, TransportError};
use mcp_probe::session::{Session, SessionEnd};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How the fake server answers each request.
#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    /// Reply to the first request with invalid JSON, then behave normally.
    GarbageFirst,
    /// Send a progress notification before every response.
    Chatty,
}

fn echo_tools() -> Value {
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "echoes input",
                "inputSchema": {
                    "type": "object",
                    "properties": {"text": {"type": "string"}}
                }
            },
            {
                "name": "search",
                "description": "full-text search",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "search terms"},
                        "mode": {"$ref": "#/$defs/mode"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "$defs": {"mode": {"type": "string", "enum": ["fast", "exact"]}}
                }
            }
        ]
    })
}

/// Spawn a fake server. The handle yields every frame it received, in order.
fn spawn_server(framing: Framing, behavior: Behavior) -> (DuplexChannel, JoinHandle<Vec<String>>) {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let (our_read, our_write) = tokio::io::split(ours);
    let (their_read, their_write) = tokio::io::split(theirs);

    let client = DuplexChannel::from_streams(our_read, our_write, framing);
    let mut server = DuplexChannel::from_streams(their_read, their_write, framing);

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        loop {
            let frame = match server.read_frame().await {
                Ok(frame) => frame,
                Err(TransportError::Closed) => break,
                Err(e) => panic!("fake server read failed: {}", e),
            };
            let text = String::from_utf8(frame).unwrap();
            let request: Value = serde_json::from_str(&text).unwrap();
            received.push(text);

            if matches!(behavior, Behavior::GarbageFirst) && received.len() == 1 {
                server.write_frame(b"not json at all").await.unwrap();
                continue;
            }
            if matches!(behavior, Behavior::Chatty) {
                let note = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {"progress": 1}});
                server.write_frame(note.to_string().as_bytes()).await.unwrap();
            }

            let result = match request["method"].as_str() {
                Some("tools/list") => echo_tools(),
                Some("tools/call") => json!({
                    "content": [{"type": "text", "text": request["params"]["arguments"].to_string()}]
                }),
                _ => json!({}),
            };
            let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
            server.write_frame(response.to_string().as_bytes()).await.unwrap();
        }
        received
    });

    (client, handle)
}

async fn run_script(framing: Framing, behavior: Behavior, script: &str) -> (String, Vec<String>) {
    let (channel, server) = spawn_server(framing, behavior);
    let session = Session::new(channel, Some(Duration::from_secs(5)));

    let mut output = Vec::new();
    let end = timeout(TEST_TIMEOUT, session.run(script.as_bytes(), &mut output))
        .await
        .expect("session timed out")
        .expect("console I/O failed");
    assert_eq!(end, SessionEnd::EndOfInput);

    let received = timeout(TEST_TIMEOUT, server)
        .await
        .expect("fake server did not finish")
        .unwrap();
    (String::from_utf8(output).unwrap(), received)
}

#[tokio::test]
async fn test_discover_describe_and_call() {
    let script = "\
list --name-only
list
list --name-only
describe echo
call echo {\"text\":\"hi\"}
call echo not-json
";
    let (output, received) = run_script(Framing::Lines, Behavior::Normal, script).await;

    assert!(output.contains("Error: tool cache is empty"), "{}", output);
    assert!(output.contains("Cached 2 tool schemas"), "{}", output);
    assert!(output.contains("Available tools:\n- echo\n- search"), "{}", output);
    assert!(output.contains("  text (string)"), "{}", output);
    assert!(output.contains(r#"{"text":"string"}"#), "{}", output);
    assert!(output.contains("Error: invalid JSON input for 'echo'"), "{}", output);

    // Only the discovery and the valid call reach the server
    assert_eq!(
        received,
        vec![
            r#"{"jsonrpc":"2.0","method":"tools/list","id":"1"}"#.to_string(),
            r#"{"jsonrpc":"2.0","method":"tools/call","id":"2","params":{"name":"echo","arguments":{"text":"hi"}}}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_describe_resolves_refs() {
    let script = "list\ndescribe search\n";
    let (output, _) = run_script(Framing::Lines, Behavior::Normal, script).await;

    assert!(output.contains("  query (string): search terms"), "{}", output);
    assert!(output.contains("  mode (string)\n    ↳ enum: [\"fast\",\"exact\"]"), "{}", output);
    assert!(output.contains(r#"{"query":"string","mode":"fast","tags":["string"]}"#), "{}", output);
    assert!(!output.contains("warning:"), "{}", output);
}

#[tokio::test]
async fn test_guided_call_over_content_length() {
    let script = "list\ncall-echo\nhello there\n";
    let (output, received) = run_script(Framing::ContentLength, Behavior::Normal, script).await;

    assert!(output.contains("Enter value for text: "), "{}", output);
    assert_eq!(
        received.last().map(String::as_str),
        Some(r#"{"jsonrpc":"2.0","method":"tools/call","id":"3","params":{"name":"echo","arguments":{"text":"hello there"}}}"#)
    );
}

#[tokio::test]
async fn test_guided_call_before_discovery() {
    let (output, received) = run_script(Framing::Lines, Behavior::Normal, "call-echo\n").await;
    assert!(output.contains("Error: tool 'echo' not found in cache"), "{}", output);
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_malformed_response_does_not_end_session() {
    let (output, received) = run_script(Framing::Lines, Behavior::GarbageFirst, "list\nlist\n").await;

    assert!(output.contains("Error: malformed response: malformed-json"), "{}", output);
    assert!(output.contains("Cached 2 tool schemas"), "{}", output);
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_notifications_are_shown_and_skipped() {
    let (output, _) = run_script(Framing::Lines, Behavior::Chatty, "list\n").await;

    assert!(output.contains("Notification: notifications/progress"), "{}", output);
    assert!(output.contains("Cached 2 tool schemas"), "{}", output);
}

#[tokio::test]
async fn test_raw_payloads() {
    let script = "\
{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":9}
[1, 2, 3]
hello
";
    let (output, received) = run_script(Framing::Lines, Behavior::Normal, script).await;

    assert_eq!(received, vec![r#"{"jsonrpc":"2.0","method":"ping","id":9}"#.to_string()]);
    assert!(output.contains("Error: invalid payload: payload must be a JSON object, got array"), "{}", output);
    assert!(output.contains("Error: invalid payload: malformed-json"), "{}", output);
}
