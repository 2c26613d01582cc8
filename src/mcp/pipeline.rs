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

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};

use crate::core::models::BackendMessage;
use crate::mcp::codec::{McpCodec, Outbound};

/// Everything a backend's I/O tasks report to its connection actor.
#[derive(Debug)]
pub enum UpstreamEvent {
    Message(BackendMessage),
    /// Unstructured log line from stderr
    Log(String),
    /// stdout or stdin is no longer usable
    Closed(String),
    /// Process terminated with optional exit code
    Terminated(Option<i32>),
}

/// Spawns a background task to read from Upstream Stdout (using McpCodec for framing)
pub fn spawn_upstream_reader<R>(stream: R, tx: mpsc::Sender<UpstreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, McpCodec::new());

        let reason = loop {
            match framed.next().await {
                Some(Ok(val)) => match BackendMessage::classify(val) {
                    Some(msg) => {
                        if tx.send(UpstreamEvent::Message(msg)).await.is_err() {
                            return;
                        }
                    }
                    None => debug!("Upstream sent a JSON value that is not JSON-RPC"),
                },
                Some(Err(e)) => {
                    error!("Upstream framing error: {}", e);
                    break format!("framing error: {}", e);
                }
                None => break "stdout closed".to_string(),
            }
        };
        let _ = tx.send(UpstreamEvent::Closed(reason)).await;
    });
}

/// Spawns the single writer for a backend's stdin. Ends when every sender is
/// dropped (closing stdin) or when a write fails.
pub fn spawn_upstream_writer<W>(
    stream: W,
    mut rx: mpsc::Receiver<Outbound>,
    tx: mpsc::Sender<UpstreamEvent>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedWrite::new(stream, McpCodec::new());

        while let Some(msg) = rx.recv().await {
            if let Err(e) = framed.send(msg).await {
                warn!("Upstream write failed: {}", e);
                let _ = tx.send(UpstreamEvent::Closed(format!("write failed: {}", e))).await;
                return;
            }
        }
        // Every sender is gone; dropping the FramedWrite closes the backend's stdin
        drop(framed);
    });
}

/// Spawns a background task to drain Upstream Stderr (Log Forwarding).
///
/// Lines are decoded lossily and the pipe is drained until EOF, whatever the
/// backend writes.
pub fn spawn_upstream_stderr_drain<R>(stream: R, tx: mpsc::Sender<UpstreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // Pipe closed
                Ok(_) => {
                    let log_msg = String::from_utf8_lossy(&buf).trim().to_string();
                    if !log_msg.is_empty() {
                        let _ = tx.send(UpstreamEvent::Log(log_msg)).await;
                    }
                }
                Err(e) => {
                    debug!("Upstream stderr read failed: {}", e);
                    break;
                }
            }
        }
    });
}
