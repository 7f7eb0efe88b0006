use std::sync::Arc;

use clap::Parser;
use gems_core::ToolRegistry;
use gems_mcp_runtime::{Dispatcher, ObservabilitySink, TracingSink, UpstreamClient};

mod config;
mod error;
mod routes;
mod sessions;
mod state;
mod telemetry;

use config::Config;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = Config::parse();
    let _log_guard = telemetry::init(config.log_dir.as_deref());

    let sink: Arc<dyn ObservabilitySink> = Arc::new(TracingSink);
    let upstream_config = config.upstream_config();
    let upstream = UpstreamClient::new(&upstream_config, sink.clone());
    let upstream_configured = upstream.is_configured();
    let dispatcher = Dispatcher::new(
        Arc::new(ToolRegistry::builtin()),
        upstream,
        config.upstream_base.clone(),
        sink,
    );

    let app = routes::app(state::AppState::new(dispatcher, upstream_configured));

    let addr = config.bind_addr();
    tracing::info!(
        event = "server_started",
        addr = %addr,
        upstream_configured,
        "Gems MCP server listening on {}/sse",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!(event = "server_stopping", "Shutdown signal received");
}
