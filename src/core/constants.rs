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

//! mcp-bridge Constants - Single source of truth for protocol values and defaults.
//!
//! This module centralizes magic numbers, error codes, and configuration
//! keys so the transport, dispatcher and HTTP layers agree on them.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    pub const VERSION: &str = "2.0";
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (standard JSON-RPC, MCP uses it for unknown tools)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// MCP handshake identity
pub mod protocol {
    pub const PROTOCOL_VERSION: &str = "2024-11-05";
    pub const CLIENT_NAME: &str = "mcp-bridge";
}

/// Timeouts (seconds) used when the environment does not override them
pub mod timeouts {
    pub const DEFAULT_HANDSHAKE_SECS: u64 = 10;
    pub const DEFAULT_TOOL_CALL_SECS: u64 = 30;
    pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 2;
    pub const DEFAULT_REQUEST_SECS: u64 = 90;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_BIND_ADDRESS: &str = "BRIDGE_BIND_ADDRESS";
    pub const ENV_PORT: &str = "PORT";
    pub const ENV_CONFIG_PATH: &str = "BRIDGE_CONFIG_PATH";
    pub const ENV_HANDSHAKE_TIMEOUT: &str = "MCP_HANDSHAKE_TIMEOUT_SECS";
    pub const ENV_TOOL_TIMEOUT: &str = "MCP_TOOL_TIMEOUT_SECS";
    pub const ENV_SHUTDOWN_GRACE: &str = "MCP_SHUTDOWN_GRACE_SECS";
    pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";
    pub const ENV_BODY_SIZE_LIMIT: &str = "BODY_SIZE_LIMIT_BYTES";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

    pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 3001;
}

/// Built-in backend names
pub mod backends {
    pub const SCARMONIT_ARCHITECTURE: &str = "scarmonit-architecture";
    pub const LLM_FRAMEWORK_DEVOPS: &str = "llm-framework-devops";
}

/// HTTP surface values
pub mod http {
    pub const REQUEST_ID_HEADER: &str = "x-request-id";
    pub const STATUS_SUCCESS: &str = "success";
    pub const STATUS_ERROR: &str = "error";
    pub const STATUS_HEALTHY: &str = "healthy";
    pub const SERVER_CONNECTED: &str = "connected";
    pub const SERVER_DISCONNECTED: &str = "disconnected";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    /// Maximum size of a Content-Length header block
    pub const MAX_HEADER_BYTES: usize = 4096;
    /// Default HTTP body limit (2 MB)
    pub const DEFAULT_BODY_SIZE_LIMIT_BYTES: usize = 2 * 1024 * 1024;
    /// Bounded queue between callers and a backend's stdin writer
    pub const WRITER_QUEUE_DEPTH: usize = 64;
    /// Upper bound on `tools/list` pages followed for one listing
    pub const MAX_TOOL_LIST_PAGES: usize = 32;
}
