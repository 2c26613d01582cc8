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

// Common test utilities: in-process fake backends behind the connector seam

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_bridge::bridge::{BackendConnector, BackendSession, ConnectionManager};
use mcp_bridge::config::{BackendServerConfig, BridgeConfig};
use mcp_bridge::core::errors::BridgeError;
use mcp_bridge::core::models::ToolDescriptor;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake backend session.
///
/// Tool behaviour by name:
/// - `fail`: tool-level error
/// - anything containing `unknown`: rejected as an unknown tool
/// - `crash`: transport breaks; the session is dead afterwards
/// - `slow`: answers after 100ms
/// - anything else: success echoing the call
pub struct MockSession {
    pub name: String,
    pub session_id: usize,
    pub alive: AtomicBool,
    pub calls: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl MockSession {
    pub fn new(name: &str, session_id: usize) -> Self {
        Self {
            name: name.to_string(),
            session_id,
            alive: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Simulate the subprocess dying underneath the bridge.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendSession for MockSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        if !self.is_alive() {
            return Err(BridgeError::BackendTransportError {
                backend: self.name.clone(),
                reason: "stdout closed".to_string(),
            });
        }
        Ok(vec![ToolDescriptor {
            name: format!("{}_tool", self.name),
            description: "fake".to_string(),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_alive() {
            return Err(BridgeError::BackendTransportError {
                backend: self.name.clone(),
                reason: "stdout closed".to_string(),
            });
        }
        match tool {
            "fail" => Err(BridgeError::ToolInvocationError {
                tool: tool.to_string(),
                message: "requested failure".to_string(),
            }),
            "crash" => {
                self.kill();
                Err(BridgeError::BackendTransportError {
                    backend: self.name.clone(),
                    reason: "process exited with code 3".to_string(),
                })
            }
            t if t.contains("unknown") => Err(BridgeError::UnknownTool {
                tool: tool.to_string(),
                message: format!("Unknown tool: {}", tool),
            }),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(json!({"backend": self.name, "session": self.session_id}))
            }
            _ => Ok(json!({
                "backend": self.name,
                "tool": tool,
                "arguments": arguments,
                "session": self.session_id,
            })),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.kill();
        Ok(())
    }
}

/// Connector that counts spawns and hands out [`MockSession`]s.
#[derive(Default)]
pub struct MockConnector {
    pub spawns: AtomicUsize,
    /// Delay before a connect completes
    pub connect_delay: Duration,
    /// Backends whose connects fail
    pub failing: Mutex<HashSet<String>>,
    pub sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockConnector {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            connect_delay: delay,
            ..Self::default()
        }
    }

    pub fn fail_backend(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn heal_backend(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn last_session(&self) -> Arc<MockSession> {
        self.sessions.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(
        &self,
        backend: &BackendServerConfig,
    ) -> Result<Arc<dyn BackendSession>, BridgeError> {
        let id = self.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.failing.lock().unwrap().contains(&backend.name) {
            return Err(BridgeError::BackendSpawnFailed {
                backend: backend.name.clone(),
                reason: "initialize handshake did not complete".to_string(),
            });
        }
        let session = Arc::new(MockSession::new(&backend.name, id));
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Two backends, `alpha` and `beta`.
pub fn test_backends() -> BTreeMap<String, BackendServerConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(
        "alpha".to_string(),
        BackendServerConfig::new("alpha", "fake", &[]),
    );
    backends.insert(
        "beta".to_string(),
        BackendServerConfig::new("beta", "fake", &[]),
    );
    backends
}

pub fn manager(connector: Arc<MockConnector>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(test_backends(), connector))
}

/// Manager over the built-in backend table.
pub fn builtin_manager(connector: Arc<MockConnector>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        BridgeConfig::builtin().backends,
        connector,
    ))
}
