//! MCP server - newline-delimited JSON-RPC over a duplex byte stream
//!
//! Provides:
//! - Request reading and per-request task spawning
//! - Method routing to the [`ToolRouter`]
//! - A single writer task so responses never interleave
//!
//! Requests are served concurrently; responses go out in completion order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{GatewayError, Result};
use crate::tools::{CallToolResult, SERVER_INSTRUCTIONS, ToolRouter};

use super::messages::{CallToolParams, Methods, Request, Response, RpcError};

/// Server name reported on `initialize`
pub const SERVER_NAME: &str = "siyuan-mcp";

/// Protocol revisions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// MCP server bound to one tool router
#[derive(Clone)]
pub struct McpServer {
    router: Arc<ToolRouter>,
}

impl McpServer {
    /// Create a new server
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self { router }
    }

    /// Serve one session until `reader` reaches EOF.
    ///
    /// Only transport I/O errors end the session early.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut tasks = JoinSet::new();
        let mut read_result = Ok(());

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    read_result = Err(GatewayError::Io(e));
                    break;
                }
            }
            if tx.is_closed() {
                break;
            }

            let trimmed = match std::str::from_utf8(&line) {
                Ok(text) => text.trim(),
                Err(e) => {
                    log::warn!("Message is not valid UTF-8: {}", e);
                    let error = RpcError::parse_error(format!("Parse error: {}", e));
                    let _ = tx.send(Response::error(Value::Null, error));
                    continue;
                }
            };
            if trimmed.is_empty() {
                continue;
            }

            let request = match parse_request(trimmed) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(response) => {
                    let _ = tx.send(response);
                    continue;
                }
            };

            let server = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                if let Some(response) = server.handle(request).await {
                    let _ = tx.send(response);
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                log_task_outcome(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_task_outcome(joined);
        }
        drop(tx);

        let write_result = writer_task
            .await
            .map_err(|e| GatewayError::Protocol(format!("Writer task failed: {}", e)))?;
        log::info!("Session ended");
        read_result.and(write_result)
    }

    /// Handle one request; `None` for notifications.
    ///
    /// A panic while serving the request is answered with an internal error for its id.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        log::debug!("Request {}: {}", id, request.method);
        let method = request.method.clone();
        let outcome = match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("Request {} ({}) panicked: {}", id, method, message);
                Err(RpcError::internal_error(format!("Internal error: {}", message)))
            }
        };

        let response = match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::error(id, error),
        };
        if !response.is_success() {
            log::debug!("Request {} ({}) failed", response.id, method);
        }
        Some(response)
    }

    async fn dispatch(&self, request: Request) -> std::result::Result<Value, RpcError> {
        match request.method.as_str() {
            Methods::INITIALIZE => Ok(self.initialize(&request.params)),
            Methods::PING => Ok(json!({})),
            Methods::TOOLS_LIST => self.list_tools().await,
            Methods::TOOLS_CALL => self.call_tool(request.params).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            Methods::INITIALIZED => log::info!("Client initialized"),
            other => log::debug!("Ignoring notification: {}", other),
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
        if let Some(client) = params.get("clientInfo") {
            log::info!("Initialize from {} (protocol {})", client, version);
        }

        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "instructions": SERVER_INSTRUCTIONS,
        })
    }

    async fn list_tools(&self) -> std::result::Result<Value, RpcError> {
        let tools = self.router.list_tools().await;
        log::debug!("Listing {} tools", tools.len());
        Ok(json!({ "tools": tools }))
    }

    async fn call_tool(&self, params: Value) -> std::result::Result<Value, RpcError> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let name = params.name;
        let result = match AssertUnwindSafe(self.router.call_tool(&name, params.arguments))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("Tool '{}' panicked: {}", name, message);
                CallToolResult::error(format!("Tool '{}' failed: {}", name, message))
            }
        };

        serde_json::to_value(result).map_err(|e| RpcError::internal_error(e.to_string()))
    }
}

/// Parse one line. `Err` carries the response to send back; `Ok(None)` means ignore.
fn parse_request(line: &str) -> std::result::Result<Option<Request>, Response> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        log::warn!("Unparseable message: {}", e);
        Response::error(Value::Null, RpcError::parse_error(format!("Parse error: {}", e)))
    })?;

    // Replies to server-initiated requests; this server never sends any.
    if value.get("method").is_none()
        && (value.get("result").is_some() || value.get("error").is_some())
    {
        log::debug!("Ignoring client response message");
        return Ok(None);
    }

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map(Some).map_err(|e| {
        Response::error(id, RpcError::invalid_request(format!("Invalid request: {}", e)))
    })
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn log_task_outcome(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        log::error!("Request task failed: {}", e);
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HostStorage;
    use crate::config::{ConfigEnv, ConfigResolver};
    use crate::tools::test_support::RecordingStore;
    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex, split};

    fn server(tools_json: Option<&str>, store: Arc<RecordingStore>) -> McpServer {
        let env = ConfigEnv {
            tools_json: tools_json.map(str::to_string),
            ..Default::default()
        };
        let router = ToolRouter::new(ConfigResolver::new(None, env), store);
        McpServer::new(Arc::new(router))
    }

    /// Host storage whose reads blow up, so any config resolution panics
    struct PanickingHost;

    #[async_trait]
    impl HostStorage for PanickingHost {
        async fn load(&self, _key: &str) -> Result<Option<Value>> {
            panic!("storage exploded")
        }

        async fn save(&self, _key: &str, _value: &Value) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Send `lines` through a full session and collect every response line
    async fn exchange(server: McpServer, lines: &[&str]) -> Vec<Value> {
        let mut input = Vec::new();
        for line in lines {
            input.extend_from_slice(line.as_bytes());
            input.push(b'\n');
        }
        exchange_bytes(server, &input).await
    }

    /// Send raw `input` through a full session and collect every response line
    async fn exchange_bytes(server: McpServer, input: &[u8]) -> Vec<Value> {
        let (client, server_io) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_io);
        let session = tokio::spawn(async move { server.serve(server_read, server_write).await });

        let (client_read, mut client_write) = split(client);
        client_write.write_all(input).await.unwrap();
        client_write.shutdown().await.unwrap();
        drop(client_write);

        session.await.unwrap().unwrap();

        let mut responses = Vec::new();
        let mut reader = BufReader::new(client_read).lines();
        while let Some(line) = reader.next_line().await.unwrap() {
            responses.push(serde_json::from_str(&line).unwrap());
        }
        responses
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses
            .iter()
            .find(|r| r["id"] == id)
            .unwrap_or_else(|| panic!("no response for id {}", id))
    }

    #[tokio::test]
    async fn test_initialize_advertises_tools_and_instructions() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        let response = server
            .handle(Request::new(
                1,
                Methods::INITIALIZE,
                json!({ "protocolVersion": "2024-11-05", "clientInfo": { "name": "test" } }),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "siyuan-mcp");
        assert!(result["instructions"].as_str().unwrap().contains("delete_block"));
    }

    #[tokio::test]
    async fn test_unsupported_protocol_version_gets_latest() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        let response = server
            .handle(Request::new(1, Methods::INITIALIZE, json!({ "protocolVersion": "1999-01-01" })))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        assert!(server.handle(Request::notification(Methods::INITIALIZED)).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        let response = server
            .handle(Request::new(3, "resources/list", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_call_with_bad_params_is_invalid_params() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        let response = server
            .handle(Request::new(4, Methods::TOOLS_CALL, json!({ "arguments": {} })))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[test]
    fn test_parse_request_errors() {
        let err = parse_request("{ nope").unwrap_err();
        assert_eq!(err.error.unwrap().code, -32700);

        let err = parse_request(r#"{"jsonrpc":"2.0","id":9}"#).unwrap_err();
        assert_eq!(err.id, json!(9));
        assert_eq!(err.error.unwrap().code, -32600);

        assert!(parse_request(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap().is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_session_over_duplex() {
        let store = Arc::new(RecordingStore::new(json!({ "notebooks": [] })));
        let server = server(Some(r#"{"list_notebooks": true}"#), store.clone());

        let responses = exchange(
            server,
            &[
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
                "this is not json",
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"list_notebooks","arguments":{}}}"#,
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"delete_block","arguments":{"id":"b1"}}}"#,
                r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#,
            ],
        )
        .await;

        assert_eq!(responses.len(), 6);

        let tools = by_id(&responses, 2)["result"]["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "list_notebooks");
        assert!(tools[0]["inputSchema"].is_object());

        let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);

        let listed = &by_id(&responses, 3)["result"];
        assert!(listed.get("isError").is_none());
        assert_eq!(listed["content"][0]["type"], "text");

        let refused = &by_id(&responses, 4)["result"];
        assert_eq!(refused["isError"], true);
        assert!(refused["content"][0]["text"].as_str().unwrap().contains("unavailable"));

        assert_eq!(by_id(&responses, 5)["result"], json!({}));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_session() {
        let server = server(None, Arc::new(RecordingStore::new(Value::Null)));
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n");

        let responses = exchange_bytes(server, &input).await;
        assert_eq!(responses.len(), 2);
        let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);
        assert_eq!(by_id(&responses, 7)["result"], json!({}));
    }

    #[tokio::test]
    async fn test_panic_outside_tool_call_answers_internal_error() {
        let resolver = ConfigResolver::new(Some(Arc::new(PanickingHost)), ConfigEnv::default());
        let store = Arc::new(RecordingStore::new(Value::Null));
        let server = McpServer::new(Arc::new(ToolRouter::new(resolver, store)));

        let responses = exchange(
            server,
            &[
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        let failed = by_id(&responses, 1);
        assert_eq!(failed["error"]["code"], -32603);
        assert!(failed["error"]["message"].as_str().unwrap().contains("storage exploded"));
        assert_eq!(by_id(&responses, 2)["result"], json!({}));
    }
}
