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

// Domain error types for the bridge

use thiserror::Error;

/// Main error type for the bridge.
///
/// Payloads are plain strings so one failed connect attempt can be handed to
/// every caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Requested backend is not in the static table (HTTP 404)
    #[error("Unknown backend: {0}")]
    BackendUnknown(String),

    /// Subprocess failed to start or the handshake did not complete (HTTP 502)
    #[error("Failed to start backend '{backend}': {reason}")]
    BackendSpawnFailed { backend: String, reason: String },

    /// An established connection broke mid-flight (HTTP 502)
    #[error("Transport to backend '{backend}' failed: {reason}")]
    BackendTransportError { backend: String, reason: String },

    /// The backend ran the tool and the tool reported failure (HTTP 500)
    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocationError { tool: String, message: String },

    /// The backend rejected the tool name (HTTP 404)
    #[error("Unknown tool: {tool} ({message})")]
    UnknownTool { tool: String, message: String },

    /// The backend did not answer within the per-call timeout (HTTP 504)
    #[error("Backend '{backend}' did not answer {method} within {timeout_secs}s")]
    ToolTimeout {
        backend: String,
        method: String,
        timeout_secs: u64,
    },

    /// The backend answered with something that is not a valid MCP result (HTTP 502)
    #[error("Malformed response from backend '{backend}': {reason}")]
    MalformedResponse { backend: String, reason: String },

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BridgeError {
    /// Whether the failure means the backend's transport is unusable and the
    /// cached connection must be dropped.
    pub fn invalidates_connection(&self) -> bool {
        matches!(self, BridgeError::BackendTransportError { .. })
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::BackendUnknown(_) => "backend_unknown",
            BridgeError::BackendSpawnFailed { .. } => "backend_spawn_failed",
            BridgeError::BackendTransportError { .. } => "backend_transport_error",
            BridgeError::ToolInvocationError { .. } => "tool_invocation_error",
            BridgeError::UnknownTool { .. } => "unknown_tool",
            BridgeError::ToolTimeout { .. } => "tool_timeout",
            BridgeError::MalformedResponse { .. } => "malformed_response",
            BridgeError::Configuration(_) => "configuration",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::BackendUnknown(_) => 404,
            BridgeError::UnknownTool { .. } => 404,
            BridgeError::BackendSpawnFailed { .. } => 502,
            BridgeError::BackendTransportError { .. } => 502,
            BridgeError::MalformedResponse { .. } => 502,
            BridgeError::ToolTimeout { .. } => 504,
            BridgeError::ToolInvocationError { .. } => 500,
            BridgeError::Configuration(_) => 500,
        }
    }

    pub(crate) fn spawn_failed(backend: &str, reason: impl std::fmt::Display) -> Self {
        BridgeError::BackendSpawnFailed {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(backend: &str, reason: impl std::fmt::Display) -> Self {
        BridgeError::BackendTransportError {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(backend: &str, reason: impl std::fmt::Display) -> Self {
        BridgeError::MalformedResponse {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_invalidate() {
        assert!(BridgeError::transport("a", "stream closed").invalidates_connection());

        let kept = [
            BridgeError::BackendUnknown("a".to_string()),
            BridgeError::spawn_failed("a", "no such file"),
            BridgeError::ToolInvocationError {
                tool: "t".to_string(),
                message: "boom".to_string(),
            },
            BridgeError::UnknownTool {
                tool: "t".to_string(),
                message: "nope".to_string(),
            },
            BridgeError::ToolTimeout {
                backend: "a".to_string(),
                method: "tools/call".to_string(),
                timeout_secs: 1,
            },
            BridgeError::malformed("a", "not an object"),
        ];
        for err in kept {
            assert!(!err.invalidates_connection(), "{} should keep the connection", err.kind());
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BridgeError::BackendUnknown("x".to_string()).status_code(), 404);
        assert_eq!(BridgeError::spawn_failed("x", "y").status_code(), 502);
        assert_eq!(BridgeError::transport("x", "y").status_code(), 502);
        assert_eq!(
            BridgeError::ToolTimeout {
                backend: "x".to_string(),
                method: "tools/call".to_string(),
                timeout_secs: 3
            }
            .status_code(),
            504
        );
    }

    #[test]
    fn test_unknown_tool_message_mentions_unknown_tool() {
        let err = BridgeError::UnknownTool {
            tool: "totally_unknown_tool".to_string(),
            message: "not registered".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Unknown tool"));
        assert!(msg.contains("totally_unknown_tool"));
    }
}
