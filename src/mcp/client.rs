// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MCP protocol client over a backend subprocess (Actor Model).
//!
//! - Writer task: owns the backend's stdin; fed by a bounded queue.
//! - Reader task: frames stdout into classified JSON-RPC messages.
//! - Connection actor: routes responses to waiting callers by request id,
//!   answers backend-initiated requests, forwards stderr to tracing, and
//!   fails every pending call once the transport is gone.
//!
//! Callers never share a response: each request gets its own id and its own
//! oneshot channel in the pending table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::BackendServerConfig;
use crate::core::constants::{jsonrpc, limits, methods, protocol};
use crate::core::errors::BridgeError;
use crate::core::models::{BackendMessage, JsonRpcRequest, JsonRpcResponse, ToolDescriptor};
use crate::mcp::codec::Outbound;
use crate::mcp::pipeline::{self, UpstreamEvent};
use crate::mcp::process::ProcessSupervisor;

type Waiter = oneshot::Sender<Result<JsonRpcResponse, BridgeError>>;

/// Timeouts applied by one client.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub handshake: Duration,
    pub tool_call: Duration,
}

/// Identity reported by the backend during `initialize`.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub protocol_version: String,
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Default)]
struct PendingState {
    /// Set once the transport is gone; no new waiters are accepted after.
    closed: Option<String>,
    waiters: HashMap<u64, Waiter>,
}

/// Request/response correlation table shared with the connection actor.
#[derive(Default)]
struct PendingTable {
    inner: Mutex<PendingState>,
}

impl PendingTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, PendingState> {
        // A poisoned table still holds valid senders.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, id: u64, waiter: Waiter) -> Result<(), String> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(reason.clone());
        }
        state.waiters.insert(id, waiter);
        Ok(())
    }

    fn take(&self, id: u64) -> Option<Waiter> {
        self.lock().waiters.remove(&id)
    }

    /// Mark closed and fail every outstanding call.
    fn close(&self, backend: &str, reason: &str) {
        let drained: Vec<Waiter> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            state.waiters.drain().map(|(_, w)| w).collect()
        };
        if !drained.is_empty() {
            warn!(backend = %backend, pending = drained.len(), "Failing in-flight calls: {}", reason);
        }
        for waiter in drained {
            let _ = waiter.send(Err(BridgeError::transport(backend, reason)));
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }
}

/// A live, initialized connection to one backend subprocess.
pub struct McpClient {
    name: String,
    next_id: AtomicU64,
    pending: Arc<PendingTable>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    supervisor: tokio::sync::Mutex<ProcessSupervisor>,
    pid: Option<u32>,
    timeouts: ClientTimeouts,
    server_info: ServerInfo,
}

impl McpClient {
    /// Spawn the backend, wire up its I/O tasks and complete the `initialize`
    /// handshake within `timeouts.handshake`. Any failure here is a spawn
    /// failure and leaves no process behind.
    pub async fn connect(
        config: &BackendServerConfig,
        timeouts: ClientTimeouts,
    ) -> Result<Self, BridgeError> {
        let (tx_events, rx_events) = mpsc::channel(limits::WRITER_QUEUE_DEPTH);
        let spawned = ProcessSupervisor::spawn(config, tx_events.clone())?;
        let pid = spawned.supervisor.pid();

        let (tx_out, rx_out) = mpsc::channel(limits::WRITER_QUEUE_DEPTH);
        pipeline::spawn_upstream_reader(spawned.stdout, tx_events.clone());
        pipeline::spawn_upstream_stderr_drain(spawned.stderr, tx_events.clone());
        pipeline::spawn_upstream_writer(spawned.stdin, rx_out, tx_events);

        let pending = Arc::new(PendingTable::default());
        tokio::spawn(run_connection_actor(
            config.name.clone(),
            rx_events,
            pending.clone(),
            tx_out.downgrade(),
        ));

        let mut client = Self {
            name: config.name.clone(),
            next_id: AtomicU64::new(1),
            pending,
            outbound: Mutex::new(Some(tx_out)),
            supervisor: tokio::sync::Mutex::new(spawned.supervisor),
            pid,
            timeouts,
            server_info: ServerInfo::default(),
        };

        let handshake = tokio::time::timeout(timeouts.handshake, client.initialize()).await;
        let failure = match handshake {
            Ok(Ok(info)) => {
                info!(
                    backend = %client.name,
                    pid = ?pid,
                    protocol = %info.protocol_version,
                    server = ?info.name,
                    "Backend initialized"
                );
                client.server_info = info;
                return Ok(client);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "initialize handshake did not complete within {}s",
                timeouts.handshake.as_secs()
            ),
        };

        client.shutdown(Duration::ZERO).await;
        Err(BridgeError::spawn_failed(&config.name, failure))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// False once stdout closed, a write failed, or the process exited.
    pub fn is_alive(&self) -> bool {
        !self.pending.is_closed()
    }

    async fn initialize(&self) -> Result<ServerInfo, BridgeError> {
        let params = json!({
            "protocolVersion": protocol::PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": protocol::CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let response = self
            .request(methods::INITIALIZE, Some(params), self.timeouts.handshake)
            .await?;
        let result = self.expect_result(methods::INITIALIZE, response)?;

        let info = ServerInfo {
            protocol_version: result
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(protocol::PROTOCOL_VERSION)
                .to_string(),
            name: result
                .pointer("/serverInfo/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            version: result
                .pointer("/serverInfo/version")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        self.send(Outbound::Request(JsonRpcRequest::notification(
            methods::INITIALIZED,
            None,
        )))
        .await?;
        Ok(info)
    }

    /// All tools, following `nextCursor` pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..limits::MAX_TOOL_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let response = self
                .request(methods::TOOLS_LIST, params, self.timeouts.tool_call)
                .await?;
            let result = self.expect_result(methods::TOOLS_LIST, response)?;

            let page = result
                .get("tools")
                .cloned()
                .ok_or_else(|| BridgeError::malformed(&self.name, "tools/list result has no 'tools'"))?;
            let page: Vec<ToolDescriptor> = serde_json::from_value(page).map_err(|e| {
                BridgeError::malformed(&self.name, format!("invalid tools/list entry: {}", e))
            })?;
            tools.extend(page);

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => return Ok(tools),
            }
        }

        warn!(backend = %self.name, "tools/list pagination exceeded page limit; truncating");
        Ok(tools)
    }

    /// Invoke `tool` with `arguments` forwarded verbatim. Returns the raw MCP
    /// result on success.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, BridgeError> {
        let params = json!({ "name": tool, "arguments": arguments });
        let response = self
            .request(methods::TOOLS_CALL, Some(params), self.timeouts.tool_call)
            .await?;

        if let Some(err) = response.error {
            return Err(classify_tool_failure(tool, err.message));
        }
        let result = response.result.unwrap_or(Value::Null);
        if !result.is_object() {
            return Err(BridgeError::malformed(
                &self.name,
                format!("tools/call result for '{}' is not an object", tool),
            ));
        }
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(classify_tool_failure(tool, content_text(&result)));
        }
        Ok(result)
    }

    /// Close stdin, give the process `grace` to exit, then kill it. In-flight
    /// calls fail with a transport error.
    pub async fn shutdown(&self, grace: Duration) {
        self.pending.close(&self.name, "connection closed by bridge");
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let mut supervisor = self.supervisor.lock().await;
        if supervisor.has_exited() {
            return;
        }
        if !grace.is_zero() && supervisor.wait_for_exit(grace).await {
            debug!(backend = %self.name, "Backend exited after stdin closed");
            return;
        }
        debug!(backend = %self.name, "Backend still running after grace period; killing");
        supervisor.kill();
        let _ = supervisor.wait_for_exit(Duration::from_secs(1)).await;
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .register(id, tx)
            .map_err(|reason| BridgeError::transport(&self.name, reason))?;

        // Deadline covers queueing too; a backend that stops reading stdin
        // leaves the writer queue full.
        let exchange = async {
            self.send(Outbound::Request(JsonRpcRequest::new(id, method, params)))
                .await?;
            rx.await
                .unwrap_or_else(|_| Err(BridgeError::transport(&self.name, "connection actor stopped")))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.pending.take(id);
                Err(e)
            }
            Err(_) => {
                // Late replies for this id are dropped by the actor
                self.pending.take(id);
                Err(BridgeError::ToolTimeout {
                    backend: self.name.clone(),
                    method: method.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn send(&self, msg: Outbound) -> Result<(), BridgeError> {
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| BridgeError::transport(&self.name, "connection closed"))?;
        sender
            .send(msg)
            .await
            .map_err(|_| BridgeError::transport(&self.name, "stdin writer stopped"))
    }

    fn expect_result(&self, method: &str, response: JsonRpcResponse) -> Result<Value, BridgeError> {
        if let Some(err) = response.error {
            return Err(BridgeError::malformed(
                &self.name,
                format!("{} failed with code {}: {}", method, err.code, err.message),
            ));
        }
        match response.result {
            Some(result) if result.is_object() => Ok(result),
            _ => Err(BridgeError::malformed(
                &self.name,
                format!("{} result is not an object", method),
            )),
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.pending.close(&self.name, "connection dropped");
    }
}

/// Tool failures that name a missing tool become `UnknownTool`.
fn classify_tool_failure(tool: &str, message: String) -> BridgeError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unknown tool") || lower.contains("tool not found") {
        BridgeError::UnknownTool {
            tool: tool.to_string(),
            message,
        }
    } else {
        BridgeError::ToolInvocationError {
            tool: tool.to_string(),
            message,
        }
    }
}

/// Text parts of an MCP `content` array, joined.
fn content_text(result: &Value) -> String {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.is_empty() {
        "tool reported an error without a message".to_string()
    } else {
        text.join("\n")
    }
}

fn response_id(id: &Value) -> Option<u64> {
    id.as_u64()
        .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
}

async fn run_connection_actor(
    backend: String,
    mut rx: mpsc::Receiver<UpstreamEvent>,
    pending: Arc<PendingTable>,
    outbound: mpsc::WeakSender<Outbound>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            UpstreamEvent::Message(BackendMessage::Response(resp)) => {
                match response_id(&resp.id).and_then(|id| pending.take(id)) {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(resp));
                    }
                    None => debug!(backend = %backend, id = %resp.id, "Dropping response with no waiter"),
                }
            }
            UpstreamEvent::Message(BackendMessage::Request(req)) => {
                let id = req.id.clone().unwrap_or(Value::Null);
                let reply = if req.method == methods::PING {
                    JsonRpcResponse::success(id, json!({}))
                } else {
                    debug!(backend = %backend, method = %req.method, "Rejecting backend-initiated request");
                    JsonRpcResponse::error(
                        id,
                        jsonrpc::ERROR_METHOD_NOT_FOUND,
                        &format!("Method not found: {}", req.method),
                    )
                };
                if let Some(tx) = outbound.upgrade() {
                    let _ = tx.send(Outbound::Response(reply)).await;
                }
            }
            UpstreamEvent::Message(BackendMessage::Notification(note)) => {
                debug!(backend = %backend, method = %note.method, "Backend notification");
            }
            UpstreamEvent::Log(line) => {
                debug!(backend = %backend, "[stderr] {}", line);
            }
            UpstreamEvent::Closed(reason) => {
                pending.close(&backend, &reason);
            }
            UpstreamEvent::Terminated(code) => {
                warn!(backend = %backend, exit_code = ?code, "Backend process terminated");
                let reason = match code {
                    Some(c) => format!("process exited with code {}", c),
                    None => "process terminated by signal".to_string(),
                };
                pending.close(&backend, &reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_classification() {
        let err = classify_tool_failure("nope", "Unknown tool: nope".to_string());
        assert!(matches!(err, BridgeError::UnknownTool { .. }));

        let err = classify_tool_failure("nope", "Tool not found".to_string());
        assert!(matches!(err, BridgeError::UnknownTool { .. }));

        let err = classify_tool_failure("disk", "disk full".to_string());
        assert!(matches!(err, BridgeError::ToolInvocationError { .. }));
    }

    #[test]
    fn test_content_text_joins_text_parts() {
        let result = json!({
            "isError": true,
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(content_text(&result), "first\nsecond");
        assert!(!content_text(&json!({"isError": true})).is_empty());
    }

    #[test]
    fn test_response_id_accepts_numeric_strings() {
        assert_eq!(response_id(&json!(7)), Some(7));
        assert_eq!(response_id(&json!("7")), Some(7));
        assert_eq!(response_id(&json!("abc")), None);
        assert_eq!(response_id(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_pending_table_fails_waiters_on_close() {
        let table = PendingTable::default();
        let (tx, rx) = oneshot::channel();
        table.register(1, tx).unwrap();

        table.close("alpha", "stdout closed");
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(BridgeError::BackendTransportError { .. })));

        let (tx, _rx) = oneshot::channel();
        assert!(table.register(2, tx).is_err());
        assert!(table.is_closed());
    }

    #[tokio::test]
    async fn test_connect_to_missing_binary_is_spawn_failure() {
        let config = BackendServerConfig::new("ghost", "/nonexistent/mcp-server-binary", &[]);
        let timeouts = ClientTimeouts {
            handshake: Duration::from_secs(1),
            tool_call: Duration::from_secs(1),
        };
        let err = McpClient::connect(&config, timeouts).await.err().unwrap();
        assert!(matches!(err, BridgeError::BackendSpawnFailed { .. }));
    }
}
