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

//! Minimal stdio MCP server for local testing.
//!
//! Tools: `echo`, `sleep` (`{"ms": n}`), `fail`, `crash`, `pid`, `env`. Requests are
//! handled concurrently, so responses may come back out of order. `--deaf` and
//! `--stderr-garbage` simulate misbehaving backends.

use clap::Parser;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use mcp_bridge::core::constants::{jsonrpc, methods, protocol};
use mcp_bridge::core::models::{JsonRpcRequest, JsonRpcResponse};

#[derive(Parser, Debug)]
#[command(about = "Stdio MCP test server")]
struct Cli {
    /// Name reported in serverInfo
    #[arg(long, default_value = "mcp-echo-server")]
    name: String,

    /// Print a non-JSON banner on stdout before serving
    #[arg(long)]
    noise: bool,

    /// Never answer `initialize`
    #[arg(long)]
    hang: bool,

    /// Stop reading stdin once the handshake completes
    #[arg(long)]
    deaf: bool,

    /// Write invalid UTF-8 to stderr at startup and log heavily to stderr on
    /// every tool call
    #[arg(long)]
    stderr_garbage: bool,

    /// Tools per `tools/list` page (0 = single page)
    #[arg(long, default_value_t = 0)]
    page_size: usize,
}

const TOOLS: &[(&str, &str)] = &[
    ("echo", "Return the arguments as text"),
    ("sleep", "Wait for `ms` milliseconds, then answer"),
    ("fail", "Report a tool-level error"),
    ("crash", "Exit the process without answering"),
    ("pid", "Return the server's process id"),
    ("env", "Return the value of environment variable `name`"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    if cli.noise {
        tx.send("mcp-echo-server starting on stdio\n".to_string()).await?;
    }

    if cli.stderr_garbage {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(b"\xff\xfe binary preamble\n").await?;
        stderr.flush().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                eprintln!("mcp-echo-server: ignoring invalid line: {}", e);
                continue;
            }
        };
        let Some(id) = req.id.clone() else {
            if req.method == methods::INITIALIZED && cli.deaf {
                // Keep stdin open but never read it again
                std::future::pending::<()>().await;
            }
            // Notifications need no answer
            continue;
        };

        if req.method == methods::INITIALIZE && cli.hang {
            continue;
        }

        let tx = tx.clone();
        let name = cli.name.clone();
        let page_size = cli.page_size;
        let chatty = cli.stderr_garbage;
        tokio::spawn(async move {
            if chatty && req.method == methods::TOOLS_CALL {
                log_burst().await;
            }
            let resp = handle(&name, page_size, id, req).await;
            if let Ok(mut out) = serde_json::to_string(&resp) {
                out.push('\n');
                let _ = tx.send(out).await;
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// About 256 KiB of stderr logging, more than a pipe buffer holds.
async fn log_burst() {
    let mut stderr = tokio::io::stderr();
    let line = format!("{}\n", "x".repeat(63));
    for _ in 0..4096 {
        if stderr.write_all(line.as_bytes()).await.is_err() {
            // Losing the log pipe is fatal, as for most real servers
            std::process::exit(1);
        }
    }
    let _ = stderr.flush().await;
}

async fn handle(name: &str, page_size: usize, id: Value, req: JsonRpcRequest) -> JsonRpcResponse {
    let params = req.params.unwrap_or(Value::Null);
    match req.method.as_str() {
        methods::INITIALIZE => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol::PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": name, "version": env!("CARGO_PKG_VERSION") }
            }),
        ),
        methods::PING => JsonRpcResponse::success(id, json!({})),
        methods::TOOLS_LIST => JsonRpcResponse::success(id, list_page(&params, page_size)),
        methods::TOOLS_CALL => call(id, &params).await,
        other => JsonRpcResponse::error(
            id,
            jsonrpc::ERROR_METHOD_NOT_FOUND,
            &format!("Method not found: {}", other),
        ),
    }
}

fn list_page(params: &Value, page_size: usize) -> Value {
    let all: Vec<Value> = TOOLS
        .iter()
        .map(|(name, description)| {
            json!({
                "name": name,
                "description": description,
                "inputSchema": { "type": "object" }
            })
        })
        .collect();
    if page_size == 0 {
        return json!({ "tools": all });
    }

    let start = params
        .get("cursor")
        .and_then(Value::as_str)
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0)
        .min(all.len());
    let end = (start + page_size).min(all.len());
    let mut page = json!({ "tools": all[start..end].to_vec() });
    if end < all.len() {
        page["nextCursor"] = json!(end.to_string());
    }
    page
}

async fn call(id: Value, params: &Value) -> JsonRpcResponse {
    let tool = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let text = |t: String| json!({ "content": [{ "type": "text", "text": t }] });
    match tool {
        "echo" => JsonRpcResponse::success(id, text(arguments.to_string())),
        "sleep" => {
            let ms = arguments.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            JsonRpcResponse::success(id, text(format!("slept {}ms", ms)))
        }
        "fail" => JsonRpcResponse::success(
            id,
            json!({
                "isError": true,
                "content": [{ "type": "text", "text": "requested failure" }]
            }),
        ),
        "crash" => std::process::exit(3),
        "pid" => JsonRpcResponse::success(id, text(std::process::id().to_string())),
        "env" => {
            let key = arguments.get("name").and_then(Value::as_str).unwrap_or("");
            JsonRpcResponse::success(id, text(std::env::var(key).unwrap_or_default()))
        }
        other => JsonRpcResponse::error(
            id,
            jsonrpc::ERROR_INVALID_PARAMS,
            &format!("Unknown tool: {}", other),
        ),
    }
}
