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

//! Domain models for the bridge.
//!
//! JSON-RPC envelopes exchanged with backends, and the ephemeral tool-call
//! request/result types that flow through the dispatcher. Free of I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constants::jsonrpc;
use crate::core::errors::BridgeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Some(Value::from(id)),
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A message read from a backend's stdout, classified by shape.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Reply to one of our requests
    Response(JsonRpcResponse),
    /// Backend-initiated request that expects a reply
    Request(JsonRpcRequest),
    /// Backend-initiated notification
    Notification(JsonRpcRequest),
}

impl BackendMessage {
    /// Classify a decoded JSON value. Returns `None` for values that are not
    /// JSON-RPC messages at all.
    pub fn classify(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        let has_method = obj.get("method").is_some_and(Value::is_string);
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());

        if has_method {
            let req: JsonRpcRequest = serde_json::from_value(value).ok()?;
            return Some(if has_id {
                BackendMessage::Request(req)
            } else {
                BackendMessage::Notification(req)
            });
        }

        if obj.contains_key("result") || obj.contains_key("error") {
            return serde_json::from_value(value)
                .ok()
                .map(BackendMessage::Response);
        }
        None
    }
}

/// A tool exposed by a backend, as reported by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// One HTTP tool call, before routing.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub tool_name: String,
    /// Opaque payload; forwarded verbatim.
    pub arguments: Value,
    pub explicit_server: Option<String>,
}

impl ToolCallRequest {
    pub fn auto(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            explicit_server: None,
        }
    }

    pub fn explicit(
        server: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            explicit_server: Some(server.into()),
        }
    }
}

/// Lifecycle of a single call through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Pending,
    Routed,
    Forwarded,
    Succeeded,
    Failed,
}

impl CallPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallPhase::Succeeded | CallPhase::Failed)
    }
}

#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(Value),
    Error(BridgeError),
}

/// Normalized result of one tool call.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub tool: String,
    pub server: String,
    pub outcome: CallOutcome,
    /// `Succeeded`, or the phase the call failed in (`Failed` if unknown).
    pub settled_in: CallPhase,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CallOutcome::Success(_))
    }

    pub fn status(&self) -> &'static str {
        if self.is_success() {
            crate::core::constants::http::STATUS_SUCCESS
        } else {
            crate::core::constants::http::STATUS_ERROR
        }
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match &self.outcome {
            CallOutcome::Error(e) => Some(e),
            CallOutcome::Success(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_response() {
        let msg = BackendMessage::classify(json!({"jsonrpc": "2.0", "id": 4, "result": {}}));
        assert!(matches!(msg, Some(BackendMessage::Response(r)) if r.id == json!(4)));
    }

    #[test]
    fn test_classify_request_and_notification() {
        let req = BackendMessage::classify(json!({"jsonrpc": "2.0", "id": "a", "method": "ping"}));
        assert!(matches!(req, Some(BackendMessage::Request(_))));

        let note = BackendMessage::classify(
            json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}}),
        );
        assert!(matches!(note, Some(BackendMessage::Notification(_))));
    }

    #[test]
    fn test_classify_rejects_non_rpc() {
        assert!(BackendMessage::classify(json!([1, 2, 3])).is_none());
        assert!(BackendMessage::classify(json!({"hello": "world"})).is_none());
    }

    #[test]
    fn test_tool_descriptor_defaults() {
        let tool: ToolDescriptor = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["type"], "object");

        let out = serde_json::to_value(&tool).unwrap();
        assert!(out.get("inputSchema").is_some());
    }
}
