//! MCP server binary entry point.

use anyhow::Result;
use mcp_runtime::{
    config::ServerConfig,
    handlers,
    protocol::{McpServerBuilder, StdioTransport},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = ServerConfig::builder().from_env()?.build()?;
    let registry = handlers::create_registry()?;

    info!(
        "Registry initialized with {} tools and {} resources",
        registry.tool_count(),
        registry.resource_count()
    );

    let server = McpServerBuilder::new()
        .registry(registry)
        .config(config.clone())
        .build()?;

    if let Some(addr) = config.listen_addr {
        tokio::select! {
            result = server.serve_tcp(addr) => result?,
            _ = tokio::signal::ctrl_c() => info!("Interrupt received, stopping listener"),
        }
    } else {
        let session = server.session();
        let transport =
            Arc::new(StdioTransport::stdio().with_max_frame_bytes(config.max_frame_bytes));

        let interrupt = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Interrupt received, closing session");
                        session.close();
                    }
                    Err(e) => error!("Failed to listen for interrupt: {}", e),
                }
            })
        };

        info!("MCP server ready, waiting for initialize on stdin...");
        let outcome = server.run_session(session, transport).await;
        interrupt.abort();
        outcome?;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_runtime=info,warn"));

    // stdout carries protocol frames, so logs go to stderr
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
