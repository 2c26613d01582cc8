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

//! Connection cache with single-flight connect.
//!
//! Each configured backend moves through
//! `NotStarted -> Connecting(shared) -> Ready | Failed`. The first caller for
//! an unconnected backend starts one connect attempt in its own task; every
//! caller that arrives while it is running awaits the same shared future.
//! A failed attempt leaves no slot behind, and a `Ready` session whose
//! transport died is evicted on the next lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{BackendServerConfig, BridgeConfig, Config};
use crate::core::errors::BridgeError;
use crate::core::models::ToolDescriptor;
use crate::mcp::client::{ClientTimeouts, McpClient};
use crate::utils::time::elapsed_ms;

/// A live protocol session with one backend.
#[async_trait]
pub trait BackendSession: Send + Sync {
    fn name(&self) -> &str;
    /// False once the transport is known to be broken.
    fn is_alive(&self) -> bool;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError>;
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, BridgeError>;
    /// Fail in-flight calls and terminate the backend.
    async fn shutdown(&self) -> Result<(), BridgeError>;
}

/// Creates sessions. Tests substitute fakes here.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(
        &self,
        backend: &BackendServerConfig,
    ) -> Result<Arc<dyn BackendSession>, BridgeError>;
}

/// Spawns backends as stdio subprocesses.
pub struct StdioConnector {
    timeouts: ClientTimeouts,
    shutdown_grace: Duration,
}

impl StdioConnector {
    pub fn new(timeouts: ClientTimeouts, shutdown_grace: Duration) -> Self {
        Self {
            timeouts,
            shutdown_grace,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ClientTimeouts {
                handshake: config.handshake_timeout(),
                tool_call: config.tool_timeout(),
            },
            config.shutdown_grace(),
        )
    }
}

#[async_trait]
impl BackendConnector for StdioConnector {
    async fn connect(
        &self,
        backend: &BackendServerConfig,
    ) -> Result<Arc<dyn BackendSession>, BridgeError> {
        let client = McpClient::connect(backend, self.timeouts).await?;
        Ok(Arc::new(StdioSession {
            client,
            grace: self.shutdown_grace,
        }))
    }
}

struct StdioSession {
    client: McpClient,
    grace: Duration,
}

#[async_trait]
impl BackendSession for StdioSession {
    fn name(&self) -> &str {
        self.client.name()
    }

    fn is_alive(&self) -> bool {
        self.client.is_alive()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        self.client.list_tools().await
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, BridgeError> {
        self.client.call_tool(tool, arguments).await
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        self.client.shutdown(self.grace).await;
        Ok(())
    }
}

type ConnectResult = Result<Arc<dyn BackendSession>, BridgeError>;
type SharedConnect = Shared<BoxFuture<'static, ConnectResult>>;

enum Slot {
    Connecting { attempt: u64, future: SharedConnect },
    Ready(Arc<dyn BackendSession>),
}

#[derive(Default)]
struct SlotTable {
    /// Set by `close_all`; no new connects after.
    closed: bool,
    slots: HashMap<String, Slot>,
}

/// Externally visible state of one backend's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotStarted,
    Connecting,
    Ready,
    /// Cached, but the transport is gone; evicted on next use.
    Failed,
}

pub struct ConnectionManager {
    backends: BTreeMap<String, BackendServerConfig>,
    connector: Arc<dyn BackendConnector>,
    table: Arc<Mutex<SlotTable>>,
    next_attempt: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        backends: BTreeMap<String, BackendServerConfig>,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self {
            backends,
            connector,
            table: Arc::new(Mutex::new(SlotTable::default())),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Manager that launches the configured backends over stdio.
    pub fn with_stdio(bridge: &BridgeConfig, config: &Config) -> Self {
        Self::new(
            bridge.backends.clone(),
            Arc::new(StdioConnector::from_config(config)),
        )
    }

    pub fn backends(&self) -> &BTreeMap<String, BackendServerConfig> {
        &self.backends
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Cached live session for `name`, connecting if needed.
    pub async fn get_or_connect(&self, name: &str) -> Result<Arc<dyn BackendSession>, BridgeError> {
        let config = self
            .backends
            .get(name)
            .ok_or_else(|| BridgeError::BackendUnknown(name.to_string()))?;

        let (attempt, evicted) = {
            let mut table = lock(&self.table);
            if table.closed {
                return Err(BridgeError::spawn_failed(name, "bridge is shutting down"));
            }

            let in_flight = match table.slots.get(name) {
                Some(Slot::Ready(session)) if session.is_alive() => {
                    return Ok(session.clone());
                }
                Some(Slot::Connecting { future, .. }) => Some(future.clone()),
                _ => None,
            };

            match in_flight {
                Some(future) => {
                    debug!(backend = %name, "Joining in-flight connect");
                    (future, None)
                }
                None => {
                    let evicted = match table.slots.remove(name) {
                        Some(Slot::Ready(dead)) => Some(dead),
                        _ => None,
                    };
                    (self.start_attempt(&mut table, config), evicted)
                }
            }
        };

        if let Some(dead) = evicted {
            info!(backend = %name, "Evicting dead connection before reconnect");
            reap(dead);
        }

        attempt.await
    }

    /// Must be called with the table locked so the attempt's own settle step
    /// cannot run before its slot exists.
    fn start_attempt(&self, table: &mut SlotTable, config: &BackendServerConfig) -> SharedConnect {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let name = config.name.clone();
        let connector = self.connector.clone();
        let shared_table = self.table.clone();
        let config = config.clone();

        info!(backend = %name, attempt, "Connecting to backend");
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = connector.connect(&config).await;
            settle(&shared_table, &config.name, attempt, &result);
            match &result {
                Ok(_) => info!(
                    backend = %config.name,
                    duration_ms = elapsed_ms(started),
                    "Backend connected"
                ),
                Err(e) => warn!(
                    backend = %config.name,
                    duration_ms = elapsed_ms(started),
                    error = %e,
                    "Backend connect failed"
                ),
            }
            result
        });

        let task_name = name.clone();
        let future = async move {
            handle.await.unwrap_or_else(|e| {
                Err(BridgeError::spawn_failed(
                    &task_name,
                    format!("connect task aborted: {}", e),
                ))
            })
        }
        .boxed()
        .shared();

        table.slots.insert(
            name,
            Slot::Connecting {
                attempt,
                future: future.clone(),
            },
        );
        future
    }

    /// Drop any cached connection for `name`; the next call respawns. An
    /// in-flight connect is left alone. Returns whether something was evicted.
    pub fn invalidate(&self, name: &str) -> bool {
        let evicted = {
            let mut table = lock(&self.table);
            if matches!(table.slots.get(name), Some(Slot::Ready(_))) {
                table.slots.remove(name)
            } else {
                None
            }
        };
        match evicted {
            Some(Slot::Ready(session)) => {
                info!(backend = %name, "Connection invalidated");
                reap(session);
                true
            }
            _ => false,
        }
    }

    /// Like [`invalidate`](Self::invalidate), but only if the cached session is
    /// still `session`. A failure on an old handle must not evict a
    /// replacement another caller already established.
    pub fn invalidate_if_current(&self, name: &str, session: &Arc<dyn BackendSession>) -> bool {
        let evicted = {
            let mut table = lock(&self.table);
            let current = matches!(
                table.slots.get(name),
                Some(Slot::Ready(cached)) if same_session(cached, session)
            );
            if current {
                table.slots.remove(name)
            } else {
                None
            }
        };
        match evicted {
            Some(Slot::Ready(session)) => {
                info!(backend = %name, "Connection invalidated after transport failure");
                reap(session);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, name: &str) -> ConnectionState {
        let table = lock(&self.table);
        match table.slots.get(name) {
            None => ConnectionState::NotStarted,
            Some(Slot::Connecting { .. }) => ConnectionState::Connecting,
            Some(Slot::Ready(session)) if session.is_alive() => ConnectionState::Ready,
            Some(Slot::Ready(_)) => ConnectionState::Failed,
        }
    }

    /// State of every configured backend.
    pub fn states(&self) -> BTreeMap<String, ConnectionState> {
        self.backends
            .keys()
            .map(|name| (name.clone(), self.state(name)))
            .collect()
    }

    /// Backends with a cached, live session. Never connects.
    pub fn connected_backends(&self) -> Vec<String> {
        let table = lock(&self.table);
        let mut names: Vec<String> = table
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Ready(session) if session.is_alive() => Some(name.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    /// Shut down every cached session, best-effort, and refuse new connects.
    /// In-flight attempts are awaited and their sessions shut down too.
    /// Returns one entry per backend that had a slot.
    pub async fn close_all(&self) -> Vec<(String, Result<(), BridgeError>)> {
        let drained: Vec<(String, Slot)> = {
            let mut table = lock(&self.table);
            table.closed = true;
            table.slots.drain().collect()
        };

        let closing = drained.into_iter().map(|(name, slot)| async move {
            let session = match slot {
                Slot::Ready(session) => session,
                Slot::Connecting { future, .. } => match future.await {
                    Ok(session) => session,
                    Err(e) => return (name, Err(e)),
                },
            };
            debug!(backend = %name, "Closing connection");
            let result = session.shutdown().await;
            (name, result)
        });

        let mut results = join_all(closing).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

fn lock(table: &Mutex<SlotTable>) -> MutexGuard<'_, SlotTable> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record the outcome of attempt `attempt`, unless its slot was taken over.
fn settle(table: &Mutex<SlotTable>, name: &str, attempt: u64, result: &ConnectResult) {
    let mut table = lock(table);
    let ours = matches!(
        table.slots.get(name),
        Some(Slot::Connecting { attempt: current, .. }) if *current == attempt
    );
    if !ours {
        // close_all drained the slot and owns the outcome
        return;
    }
    match result {
        Ok(session) => {
            table
                .slots
                .insert(name.to_string(), Slot::Ready(session.clone()));
        }
        Err(_) => {
            table.slots.remove(name);
        }
    }
}

fn same_session(a: &Arc<dyn BackendSession>, b: &Arc<dyn BackendSession>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Shut down an evicted session in the background.
fn reap(session: Arc<dyn BackendSession>) {
    tokio::spawn(async move {
        if let Err(e) = session.shutdown().await {
            debug!(backend = %session.name(), error = %e, "Evicted session shutdown failed");
        }
    });
}
