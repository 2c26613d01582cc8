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

// Main entry point for the MCP bridge
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use mcp_bridge::api::{create_router, AppState};
use mcp_bridge::bridge::{ConnectionManager, ShutdownCoordinator, ToolRouter};
use mcp_bridge::config::{BridgeConfig, Config};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML backend and routing table (overrides BRIDGE_CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides BRIDGE_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,

    /// Dry run: prints the effective backend table and routes as YAML and exits.
    #[arg(long)]
    dry_run: bool,

    /// Print the backend a tool name routes to and exit.
    #[arg(long, value_name = "TOOL")]
    route: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // CLI flags overlay the environment
    if let Some(path) = cli.config {
        config.config_path = Some(path);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    let bridge = match BridgeConfig::load(config.config_path.as_deref()) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "Failed to load backend table");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let router = Arc::new(ToolRouter::from_config(&bridge));

    if let Some(tool) = cli.route {
        println!("{}", router.resolve(&tool));
        return Ok(());
    }

    if cli.dry_run {
        let yaml = serde_yaml_ng::to_string(&bridge).context("Failed to render config")?;
        println!("# Effective bridge configuration");
        print!("{}", yaml);
        return Ok(());
    }

    match &config.config_path {
        Some(path) => info!(path = %path.display(), "Loaded backend table"),
        None => info!("Using built-in backend table"),
    }
    for (name, backend) in &bridge.backends {
        info!(backend = %name, command = %backend.command, args = ?backend.args, "Backend configured");
    }

    let connections = Arc::new(ConnectionManager::with_stdio(&bridge, &config));
    let app_state = AppState::new(connections.clone(), router, config.clone());
    let app = create_router(&app_state).with_state(app_state);

    let addr = config.listen_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "MCP bridge listening on {}", addr);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "Server error");
    }

    let report = ShutdownCoordinator::new(connections).shutdown().await;
    if !report.is_clean() {
        warn!(failed = report.failed.len(), "Some backends did not close cleanly");
    }

    info!("Server shutdown complete");
    served.context("HTTP server failed")
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("mcp_bridge=debug,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
