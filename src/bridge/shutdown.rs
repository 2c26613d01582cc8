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

use std::sync::Arc;

use tracing::{error, info};

use crate::bridge::connection::ConnectionManager;
use crate::core::errors::BridgeError;

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub closed: Vec<String>,
    pub failed: Vec<(String, BridgeError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Closes every backend once the HTTP server has stopped.
pub struct ShutdownCoordinator {
    connections: Arc<ConnectionManager>,
}

impl ShutdownCoordinator {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Returns after every close attempt has settled. One backend failing to
    /// close does not stop the others.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Closing backend connections");
        let mut report = ShutdownReport::default();

        for (name, result) in self.connections.close_all().await {
            match result {
                Ok(()) => {
                    info!(backend = %name, "Backend closed");
                    report.closed.push(name);
                }
                Err(e) => {
                    error!(backend = %name, error = %e, "Backend failed to close cleanly");
                    report.failed.push((name, e));
                }
            }
        }

        info!(
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Backend shutdown complete"
        );
        report
    }
}
