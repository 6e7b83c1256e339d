//! Binary entrypoint: configuration, wiring, and graceful shutdown.

use clap::Parser;
use novelai_mcp::session::SWEEP_INTERVAL;
use novelai_mcp::transport::ToolServerTransport;
use novelai_mcp::{Config, ImageServer, NovelAiClient, SessionManager};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "novelai-mcp", about = "MCP server for NovelAI image generation")]
struct Args {
    /// Port to listen on. Overrides the PORT environment variable.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let port = args.port.unwrap_or(config.port);

    match &config.proxy {
        Some(proxy) => info!(proxy = %proxy, "Outbound proxy configured"),
        None => info!("No outbound proxy configured"),
    }

    let client = NovelAiClient::new(&config)?;
    let server = Arc::new(ImageServer::new(client));
    let sessions = Arc::new(SessionManager::new(ToolServerTransport::factory(server)));
    let sweeper = sessions.spawn_idle_sweeper(SWEEP_INTERVAL);

    let app = novelai_mcp::http::router(Arc::clone(&sessions));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "NovelAI MCP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    sweeper.abort();
    sessions.shutdown().await;
    info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    }
}
