//! fsx-server binary — thin CLI shell over the HTTP, RPC, and MCP transport
//! crates. Wires a single [`fsx_core::Kernel`] into all three surfaces.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use fsx_core::kernel::{Kernel, KernelLimits};
use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
use fsx_core::WatchManager;
use fsx_http::{AppState, HandleTable};
use fsx_mcp::McpState;
use fsx_rpc::RpcState;

/// fsx — namespaced virtual filesystem service: JSON-HTTP, RPC bulk/stream, and MCP tools.
#[derive(Parser)]
#[command(name = "fsx-server", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Load engine config from a TOML file (default: ./fsx.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,

    /// Explicit port (default: scan 8432..=8441 for a free one)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the resolved config, then exit without serving
    Validate,
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("fsx=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config_path = fsx_server::config::discover(cli.config.clone());
    let config = fsx_server::config::load(config_path.as_deref());

    if let Some(Commands::Validate) = &cli.command {
        println!("{}", toml::to_string_pretty(&config).unwrap_or_else(|_| "<unserializable config>".to_string()));
        return;
    }

    for ns in &config.namespaces {
        info!(namespace = ns.id.as_str(), "configured namespace");
    }

    let metadata = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let watch = Arc::new(WatchManager::new());
    let limits: KernelLimits = config.limits.to_kernel_limits();
    let kernel = Arc::new(Kernel::new(metadata, blobs, watch, limits));

    let http_state =
        AppState { kernel: Arc::clone(&kernel), auth: config.auth.clone(), handles: Arc::new(HandleTable::new()) };
    let mcp_state = McpState::new(Arc::clone(&kernel), config.auth.clone(), "default");
    let rpc_state = RpcState::new(Arc::clone(&kernel), config.auth.clone());

    let app: Router = fsx_http::router(http_state)
        .merge(fsx_mcp::router(mcp_state))
        .merge(fsx_rpc::router(rpc_state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let bind_addr = if cli.bind_all { "0.0.0.0" } else { "127.0.0.1" };

    let explicit_port = cli.port.or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()));

    let listener = if let Some(port) = explicit_port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|e| {
            tracing::error!(port = port, error = %e, "could not bind to port");
            eprintln!("  PORT={port} was set explicitly. Choose a different port.");
            std::process::exit(1);
        })
    } else {
        const BASE: u16 = 8432;
        const RANGE: u16 = 10;
        let mut found = None;
        for port in BASE..BASE + RANGE {
            if let Ok(l) = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
                found = Some(l);
                break;
            }
        }
        found.unwrap_or_else(|| {
            tracing::error!(range_start = BASE, range_end = BASE + RANGE - 1, "no free port found");
            eprintln!("  Try: PORT=<port> fsx-server");
            std::process::exit(1);
        })
    };

    let port = listener.local_addr().unwrap().port();
    info!(port = port, "HTTP + MCP + RPC listening");
    info!("JSON API under /api/fs/*, MCP transport at /mcp, RPC transport at /rpc");
    eprintln!("FSX_PORT={port}");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
