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

//! Backend process management with Zombie Process Protection.
//!
//! Backends are bound to the bridge: they are killed when their supervisor is
//! dropped, and on Linux they also receive SIGKILL if the bridge itself dies.

use crate::config::BackendServerConfig;
use crate::core::errors::BridgeError;
use crate::mcp::pipeline::UpstreamEvent;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

pub struct ProcessSupervisor {
    // Channel to trigger manual kill
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    pid: Option<u32>,
}

pub struct SpawnedProcess {
    pub supervisor: ProcessSupervisor,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ProcessSupervisor {
    pub fn spawn(
        backend: &BackendServerConfig,
        tx_events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<SpawnedProcess, BridgeError> {
        debug!(
            backend = %backend.name,
            "ProcessSupervisor: spawning '{}' with args {:?}", backend.command, backend.args
        );

        let mut command = Command::new(&backend.command);
        command
            .args(&backend.args)
            .envs(&backend.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // ------------------------------------------------------------------
        // LINUX: PR_SET_PDEATHSIG
        // ------------------------------------------------------------------
        #[cfg(target_os = "linux")]
        // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and only touches
        // the forked child's own process attributes before exec.
        unsafe {
            command.pre_exec(|| {
                // Send SIGKILL to child if the bridge dies
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|e| {
            BridgeError::spawn_failed(
                &backend.name,
                format!("Failed to spawn '{}': {}", backend.command, e),
            )
        })?;
        let pid = child.id();

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => {
                    return Err(BridgeError::spawn_failed(
                        &backend.name,
                        "Child process is missing a piped stdio handle",
                    ))
                }
            };

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        let name = backend.name.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                _ = kill_rx => {
                    let _ = child.kill().await;
                    child.wait().await
                }
                status = child.wait() => status,
            };
            let code = status.ok().and_then(|s| s.code());
            debug!(backend = %name, exit_code = ?code, "Backend process exited");
            let _ = exited_tx.send(true);
            let _ = tx_events.send(UpstreamEvent::Terminated(code)).await;
        });

        Ok(SpawnedProcess {
            supervisor: Self {
                kill_tx: Some(kill_tx),
                exited: exited_rx,
                pid,
            },
            stdin,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Wait up to `grace` for the process to exit on its own.
    pub async fn wait_for_exit(&self, grace: Duration) -> bool {
        let mut exited = self.exited.clone();
        let waited = tokio::time::timeout(grace, exited.wait_for(|done| *done))
            .await
            .map(|changed| changed.is_ok());
        matches!(waited, Ok(true))
    }

    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.kill();
    }
}
