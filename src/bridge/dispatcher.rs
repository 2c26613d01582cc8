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

//! Request dispatcher: the single entry point for tool calls.
//!
//! Resolves a backend (router or explicit), obtains a session from the
//! connection manager, forwards the call and normalizes every outcome into a
//! [`ToolCallResult`]. Nothing escapes as an error.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bridge::connection::ConnectionManager;
use crate::bridge::router::ToolRouter;
use crate::core::errors::BridgeError;
use crate::core::models::{CallOutcome, CallPhase, ToolCallRequest, ToolCallResult, ToolDescriptor};
use crate::utils::time::{elapsed_ms, now};

#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<ToolRouter>,
    connections: Arc<ConnectionManager>,
}

impl Dispatcher {
    pub fn new(router: Arc<ToolRouter>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            router,
            connections,
        }
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Tool name only; the router picks the backend.
    pub async fn call_auto(&self, tool: &str, arguments: Value) -> ToolCallResult {
        self.call(ToolCallRequest::auto(tool, arguments)).await
    }

    /// Caller names the backend.
    pub async fn call_explicit(&self, server: &str, tool: &str, arguments: Value) -> ToolCallResult {
        self.call(ToolCallRequest::explicit(server, tool, arguments)).await
    }

    /// Run one call to completion. The call runs in its own task, so a
    /// dropped caller does not abandon a forwarded request mid-flight.
    pub async fn call(&self, request: ToolCallRequest) -> ToolCallResult {
        let timestamp = now();
        let tool = request.tool_name.clone();
        let server = request.explicit_server.clone();
        let router = self.router.clone();
        let connections = self.connections.clone();

        let task = tokio::spawn(execute(router, connections, request, timestamp));
        match task.await {
            Ok(result) => result,
            Err(e) => ToolCallResult {
                tool: tool.clone(),
                server: server.unwrap_or_else(|| self.router.resolve(&tool).to_string()),
                outcome: CallOutcome::Error(BridgeError::ToolInvocationError {
                    tool,
                    message: format!("dispatch task failed: {}", e),
                }),
                settled_in: CallPhase::Failed,
                execution_time_ms: 0,
                timestamp,
            },
        }
    }

    /// Tool listing for one backend. Connects if needed.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let session = self.connections.get_or_connect(server).await?;
        match session.list_tools().await {
            Ok(tools) => Ok(tools),
            Err(e) => {
                if e.invalidates_connection() {
                    self.connections.invalidate_if_current(server, &session);
                }
                Err(e)
            }
        }
    }
}

async fn execute(
    router: Arc<ToolRouter>,
    connections: Arc<ConnectionManager>,
    request: ToolCallRequest,
    timestamp: DateTime<Utc>,
) -> ToolCallResult {
    let ToolCallRequest {
        tool_name: tool,
        arguments,
        explicit_server,
    } = request;

    let routed_by = if explicit_server.is_some() { "explicit" } else { "router" };
    let server = explicit_server.unwrap_or_else(|| router.resolve(&tool).to_string());
    debug!(tool = %tool, backend = %server, routed_by, phase = ?CallPhase::Routed, "Tool call routed");

    let failed = |server: String, error: BridgeError, phase: CallPhase, ms: u64| {
        warn!(
            tool = %tool,
            backend = %server,
            phase = ?phase,
            error_kind = error.kind(),
            duration_ms = ms,
            "Tool call failed: {}",
            error
        );
        ToolCallResult {
            tool: tool.clone(),
            server,
            outcome: CallOutcome::Error(error),
            settled_in: phase,
            execution_time_ms: ms,
            timestamp,
        }
    };

    let session = match connections.get_or_connect(&server).await {
        Ok(session) => session,
        Err(e) => return failed(server, e, CallPhase::Routed, 0),
    };

    debug!(tool = %tool, backend = %server, phase = ?CallPhase::Forwarded, "Forwarding tool call");
    let started = Instant::now();
    let outcome = session.call_tool(&tool, arguments).await;
    let ms = elapsed_ms(started);

    match outcome {
        Ok(data) => {
            info!(tool = %tool, backend = %server, duration_ms = ms, "Tool call succeeded");
            ToolCallResult {
                tool: tool.clone(),
                server,
                outcome: CallOutcome::Success(data),
                settled_in: CallPhase::Succeeded,
                execution_time_ms: ms,
                timestamp,
            }
        }
        Err(e) => {
            if e.invalidates_connection() {
                connections.invalidate_if_current(&server, &session);
            }
            failed(server, e, CallPhase::Forwarded, ms)
        }
    }
}
