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

// Request handlers for API endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::middleware::RequestId;
use crate::api::responses::{
    ApiError, BackendSummary, ServersResponse, ToolCallResponse, ToolListResponse,
};
use crate::api::AppState;
use crate::bridge::health::{HealthSnapshot, ServerHealth};

/// GET /api/health
///
/// Reports only backends with a live connection; never connects.
pub async fn health_handler(State(app_state): State<AppState>) -> Json<HealthSnapshot> {
    Json(app_state.health.snapshot())
}

/// GET /api/health/:server
pub async fn server_health_handler(
    State(app_state): State<AppState>,
    Path(server): Path<String>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Json<ServerHealth>, ApiError> {
    let health = app_state
        .health
        .probe(&server)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;
    Ok(Json(health))
}

/// GET /api/servers
pub async fn servers_handler(State(app_state): State<AppState>) -> Json<ServersResponse> {
    let states = app_state.connections.states();
    let backends = app_state
        .connections
        .backends()
        .values()
        .map(|backend| BackendSummary {
            name: backend.name.clone(),
            command: backend.command.clone(),
            args: backend.args.clone(),
            state: states
                .get(&backend.name)
                .copied()
                .unwrap_or(crate::bridge::ConnectionState::NotStarted),
        })
        .collect();

    Json(ServersResponse {
        default_backend: app_state.router.default_backend().to_string(),
        backends,
        routes: app_state.router.rules().to_vec(),
    })
}

/// GET /api/tools/:server
pub async fn list_tools_handler(
    State(app_state): State<AppState>,
    Path(server): Path<String>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let tools = app_state
        .dispatcher
        .list_tools(&server)
        .await
        .map_err(|e| {
            warn!(backend = %server, request_id = %request_id, error = %e, "Tool listing failed");
            ApiError::from(e).with_request_id(&request_id)
        })?;

    info!(backend = %server, request_id = %request_id, count = tools.len(), "Listed tools");
    Ok(Json(ToolListResponse { server, tools }))
}

/// POST /api/tools/:tool
///
/// Body is the tool's arguments, forwarded verbatim. An empty body means `{}`.
pub async fn call_tool_handler(
    State(app_state): State<AppState>,
    Path(tool): Path<String>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<ToolCallResponse, ApiError> {
    let arguments = parse_arguments(&body).map_err(|e| e.with_request_id(&request_id))?;
    info!(tool = %tool, request_id = %request_id, "Received tool call");

    let result = app_state.dispatcher.call_auto(&tool, arguments).await;
    log_result(&request_id, &result);
    Ok(ToolCallResponse(result))
}

/// POST /api/tools/:server/:tool
pub async fn call_server_tool_handler(
    State(app_state): State<AppState>,
    Path((server, tool)): Path<(String, String)>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<ToolCallResponse, ApiError> {
    let arguments = parse_arguments(&body).map_err(|e| e.with_request_id(&request_id))?;
    info!(tool = %tool, backend = %server, request_id = %request_id, "Received tool call");

    let result = app_state
        .dispatcher
        .call_explicit(&server, &tool, arguments)
        .await;
    log_result(&request_id, &result);
    Ok(ToolCallResponse(result))
}

fn parse_arguments(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Request body is not valid JSON: {}", e)))
}

fn log_result(request_id: &str, result: &crate::core::models::ToolCallResult) {
    info!(
        tool = %result.tool,
        backend = %result.server,
        request_id = %request_id,
        status = result.status(),
        duration_ms = result.execution_time_ms,
        "Tool call settled"
    );
}
