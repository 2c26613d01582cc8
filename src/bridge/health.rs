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

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::bridge::connection::ConnectionManager;
use crate::core::constants::http;
use crate::core::errors::BridgeError;
use crate::utils::time::{format_timestamp, now};

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub timestamp: String,
    pub servers: BTreeMap<String, &'static str>,
}

/// Body of `GET /api/health/:server`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    pub server: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HealthReporter {
    connections: Arc<ConnectionManager>,
}

impl HealthReporter {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Backends with a live cached connection. Never-contacted backends are
    /// omitted and nothing is connected.
    pub fn snapshot(&self) -> HealthSnapshot {
        let servers = self
            .connections
            .connected_backends()
            .into_iter()
            .map(|name| (name, http::SERVER_CONNECTED))
            .collect();
        HealthSnapshot {
            status: http::STATUS_HEALTHY,
            timestamp: format_timestamp(&now()),
            servers,
        }
    }

    /// Connect-on-probe. Only an unknown backend is an error; a failed
    /// connect is reported as `disconnected`.
    pub async fn probe(&self, server: &str) -> Result<ServerHealth, BridgeError> {
        if !self.connections.is_configured(server) {
            return Err(BridgeError::BackendUnknown(server.to_string()));
        }
        let health = match self.connections.get_or_connect(server).await {
            Ok(_) => ServerHealth {
                server: server.to_string(),
                status: http::SERVER_CONNECTED,
                error: None,
            },
            Err(e) => {
                debug!(backend = %server, error = %e, "Health probe could not connect");
                ServerHealth {
                    server: server.to_string(),
                    status: http::SERVER_DISCONNECTED,
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(health)
    }
}
