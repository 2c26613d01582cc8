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

// Response types for API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::bridge::connection::ConnectionState;
use crate::bridge::router::RoutingRule;
use crate::core::constants::http;
use crate::core::errors::BridgeError;
use crate::core::models::{CallOutcome, ToolCallResult, ToolDescriptor};
use crate::utils::time::format_timestamp;

/// Uniform success envelope for tool calls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub status: &'static str,
    pub data: Value,
    pub server: String,
    pub execution_time: u64,
    pub timestamp: String,
}

/// Uniform error envelope for tool calls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub error: String,
    pub kind: &'static str,
    pub tool: String,
    pub server: String,
    pub execution_time: u64,
    pub timestamp: String,
}

/// A settled tool call. 200 on success, 500 on any failure.
#[derive(Debug)]
pub struct ToolCallResponse(pub ToolCallResult);

impl IntoResponse for ToolCallResponse {
    fn into_response(self) -> Response {
        let result = self.0;
        let timestamp = format_timestamp(&result.timestamp);
        match result.outcome {
            CallOutcome::Success(data) => (
                StatusCode::OK,
                Json(SuccessEnvelope {
                    status: http::STATUS_SUCCESS,
                    data,
                    server: result.server,
                    execution_time: result.execution_time_ms,
                    timestamp,
                }),
            )
                .into_response(),
            CallOutcome::Error(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorEnvelope {
                    status: http::STATUS_ERROR,
                    error: err.to_string(),
                    kind: err.kind(),
                    tool: result.tool,
                    server: result.server,
                    execution_time: result.execution_time_ms,
                    timestamp,
                }),
            )
                .into_response(),
        }
    }
}

/// Body of `GET /api/tools/:server`
#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub server: String,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub state: ConnectionState,
}

/// Body of `GET /api/servers`
#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub default_backend: String,
    pub backends: Vec<BackendSummary>,
    pub routes: Vec<RoutingRule>,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// API error type that converts domain errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub kind: Option<&'static str>,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: None,
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            kind: self.kind,
            request_id: self.request_id,
        });
        (self.status, body).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: err.to_string(),
            kind: Some(err.kind()),
            request_id: None,
        }
    }
}
