//! Client tests against a scripted in-memory server.

use std::time::Duration;

use pbimeta::mcp::{ClientOptions, McpClient, McpError, SessionState};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

struct FakeServer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read from client")
            .expect("client closed its output");
        serde_json::from_str(&line).expect("client sent valid JSON")
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn reply(&mut self, id: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    async fn handshake(&mut self) {
        let request = self.recv().await;
        assert_eq!(request["method"], "initialize");
        assert_eq!(request["params"]["protocolVersion"], "2024-11-05");
        assert!(request["params"]["clientInfo"]["name"].is_string());
        self.reply(
            &request["id"],
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-pbixray", "version": "0.0.1"}
            }),
        )
        .await;

        let notification = self.recv().await;
        assert_eq!(notification["method"], "notifications/initialized");
        assert!(notification.get("id").is_none());
    }
}

fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

fn connect(options: ClientOptions) -> (McpClient, FakeServer) {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let (server_read, server_write) = tokio::io::split(server_side);

    let client = McpClient::from_streams(client_read, client_write, options);
    let server = FakeServer {
        lines: BufReader::new(server_read).lines(),
        writer: server_write,
    };
    (client, server)
}

async fn ready_pair() -> (McpClient, FakeServer) {
    let (client, mut server) = connect(ClientOptions::default());
    let (info, _) = tokio::join!(client.initialize(), server.handshake());
    assert_eq!(info.unwrap().server_info.name, "fake-pbixray");
    assert_eq!(client.state(), SessionState::Ready);
    (client, server)
}

#[tokio::test]
async fn test_concurrent_calls_resolve_by_id() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let first = server.recv().await;
        let second = server.recv().await;
        let third = server.recv().await;
        // Answer in reverse order of arrival.
        for request in [&third, &second, &first] {
            let tool = request["params"]["name"].as_str().unwrap().to_string();
            server.reply(&request["id"], text_result(&tool)).await;
        }
        (first, second, third)
    };

    let (a, b, c, (first, second, third)) = tokio::join!(
        client.call_tool("get_tables", json!({})),
        client.call_tool("get_dax_measures", json!({})),
        client.call_tool("get_relationships", Value::Null),
        server_task
    );

    assert_eq!(a.unwrap().first_text(), Some("get_tables"));
    assert_eq!(b.unwrap().first_text(), Some("get_dax_measures"));
    assert_eq!(c.unwrap().first_text(), Some("get_relationships"));

    let ids: Vec<u64> = [&first, &second, &third]
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 3, "ids must be distinct: {ids:?}");
    assert!(ids.iter().all(|id| *id > 1), "id 1 was used by the handshake");

    // Null arguments are sent as an empty object.
    let null_args = [&first, &second, &third]
        .into_iter()
        .find(|r| r["params"]["name"] == "get_relationships")
        .unwrap();
    assert_eq!(null_args["params"]["arguments"], json!({}));
}

#[tokio::test]
async fn test_server_exit_fails_pending_calls() {
    let (client, mut server) = ready_pair().await;

    let server_task = async move {
        let _ = server.recv().await;
        let _ = server.recv().await;
        drop(server);
    };

    let (a, b, ()) = tokio::join!(
        client.call_tool("get_tables", json!({})),
        client.call_tool("get_schema", json!({"table_name": "Sales"})),
        server_task
    );

    for outcome in [a, b] {
        let err = outcome.unwrap_err();
        assert!(matches!(err, McpError::Connection(_)), "{err:?}");
    }

    // Later calls fail fast instead of hanging.
    let err = client.call_tool("get_tables", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::Connection(_)), "{err:?}");
    assert_eq!(err.kind(), pbimeta::ErrorKind::Connection);
}

#[tokio::test]
async fn test_timeout_abandons_call_and_discards_late_answer() {
    let (client, mut server) = ready_pair().await;

    let (outcome, request) = tokio::join!(
        client.call_tool_with_timeout("get_tables", json!({}), Duration::from_millis(50)),
        server.recv()
    );
    let err = outcome.unwrap_err();
    assert!(matches!(err, McpError::Timeout { ref method, .. } if method == "tools/call"));

    // The late answer is dropped; the session stays usable.
    server.reply(&request["id"], text_result("late")).await;

    let server_task = async {
        let next = server.recv().await;
        server.reply(&next["id"], text_result("fresh")).await;
    };
    let (result, ()) = tokio::join!(client.call_tool("get_tables", json!({})), server_task);
    assert_eq!(result.unwrap().first_text(), Some("fresh"));
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let request = server.recv().await;
        server.send_raw("this is not json").await;
        server.send_raw("[1, 2, 3]").await;
        server.send_raw("").await;
        server.reply(&request["id"], text_result("ok")).await;
    };

    let (result, ()) = tokio::join!(client.call_tool("get_tables", json!({})), server_task);
    assert_eq!(result.unwrap().first_text(), Some("ok"));
}

#[tokio::test]
async fn test_null_error_beside_result_is_success() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let request = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": text_result("ok"),
                "error": null
            }))
            .await;
    };

    let (result, ()) = tokio::join!(client.call_tool("get_tables", json!({})), server_task);
    assert_eq!(result.unwrap().first_text(), Some("ok"));
}

#[tokio::test]
async fn test_error_object_becomes_tool_error() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let request = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -32602, "message": "unknown tool: get_everything"}
            }))
            .await;
    };

    let (result, ()) = tokio::join!(client.call_tool("get_everything", json!({})), server_task);
    match result.unwrap_err() {
        McpError::Tool { code, message } => {
            assert_eq!(code, Some(-32602));
            assert_eq!(message, "unknown tool: get_everything");
        }
        other => panic!("expected tool error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_is_error_result_becomes_tool_error() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let request = server.recv().await;
        server
            .reply(
                &request["id"],
                json!({
                    "content": [{"type": "text", "text": "No model loaded"}],
                    "isError": true
                }),
            )
            .await;
    };

    let (result, ()) = tokio::join!(client.call_tool("get_tables", json!({})), server_task);
    let err = result.unwrap_err();
    assert!(
        matches!(err, McpError::Tool { code: None, ref message } if message == "No model loaded"),
        "{err:?}"
    );
    assert_eq!(err.kind(), pbimeta::ErrorKind::Tool);
}

#[tokio::test]
async fn test_server_requests_are_answered() {
    let (client, mut server) = ready_pair().await;

    server
        .send(json!({"jsonrpc": "2.0", "id": "ping-1", "method": "ping"}))
        .await;
    let pong = server.recv().await;
    assert_eq!(pong["id"], "ping-1");
    assert_eq!(pong["result"], json!({}));

    server
        .send(json!({"jsonrpc": "2.0", "id": 7, "method": "sampling/createMessage", "params": {}}))
        .await;
    let rejection = server.recv().await;
    assert_eq!(rejection["id"], 7);
    assert_eq!(rejection["error"]["code"], -32601);

    server
        .send(json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}}))
        .await;

    let server_task = async {
        let request = server.recv().await;
        server.reply(&request["id"], text_result("still here")).await;
    };
    let (result, ()) = tokio::join!(client.call_tool("get_tables", json!({})), server_task);
    assert_eq!(result.unwrap().first_text(), Some("still here"));
}

#[tokio::test]
async fn test_list_tools_follows_cursor() {
    let (client, mut server) = ready_pair().await;

    let server_task = async {
        let first = server.recv().await;
        assert_eq!(first["method"], "tools/list");
        assert!(first["params"].get("cursor").is_none());
        server
            .reply(
                &first["id"],
                json!({
                    "tools": [{"name": "load_pbix_file", "inputSchema": {"type": "object"}}],
                    "nextCursor": "page-2"
                }),
            )
            .await;

        let second = server.recv().await;
        assert_eq!(second["params"]["cursor"], "page-2");
        server
            .reply(
                &second["id"],
                json!({
                    "tools": [{
                        "name": "get_tables",
                        "description": "List tables",
                        "inputSchema": {"type": "object", "properties": {}}
                    }]
                }),
            )
            .await;
    };

    let (tools, ()) = tokio::join!(client.list_tools(), server_task);
    let tools = tools.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["load_pbix_file", "get_tables"]);
    assert_eq!(tools[1].description.as_deref(), Some("List tables"));
}

#[tokio::test]
async fn test_close_is_terminal() {
    let (client, mut server) = ready_pair().await;

    client.close().await;
    assert_eq!(client.state(), SessionState::Closed);

    // The server sees end of input once the client has closed.
    let eof = server.lines.next_line().await.unwrap();
    assert!(eof.is_none());

    let err = client.call_tool("get_tables", json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        McpError::InvalidState {
            actual: SessionState::Closed,
            ..
        }
    ));

    // Closing twice is harmless.
    client.close().await;
}

#[tokio::test]
async fn test_malformed_handshake_is_connection_error() {
    let (client, mut server) = connect(ClientOptions::default());

    let server_task = async {
        let request = server.recv().await;
        server.reply(&request["id"], json!({"unexpected": true})).await;
    };

    let (outcome, ()) = tokio::join!(client.initialize(), server_task);
    let err = outcome.unwrap_err();
    assert!(matches!(err, McpError::Connection(_)), "{err:?}");
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_scoped_session_closes_on_error() {
    let (client, mut server) = connect(ClientOptions::default());

    let server_task = async {
        server.handshake().await;
        let request = server.recv().await;
        server
            .reply(
                &request["id"],
                json!({"content": [{"type": "text", "text": "boom"}], "isError": true}),
            )
            .await;
        // The scope closes the session even though the body failed.
        server.lines.next_line().await.unwrap()
    };

    let scoped = client.scoped(|c| {
        Box::pin(async move {
            c.call_tool("get_tables", json!({})).await?;
            Ok::<_, McpError>(())
        })
    });
    let (outcome, eof) = tokio::join!(scoped, server_task);
    assert!(matches!(outcome, Err(McpError::Tool { .. })));
    assert!(eof.is_none());
}
