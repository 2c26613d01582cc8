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

//! mcp-bridge: an HTTP gateway for stdio MCP servers.
//!
//! This library provides the core logic for the bridge: it spawns Model Context
//! Protocol (MCP) servers as subprocesses on demand, multiplexes concurrent tool
//! calls over their stdio transports, and routes tool names to backends.

pub mod api;
pub mod bridge;
pub mod config;
pub mod core;
pub mod mcp;
pub mod utils;
