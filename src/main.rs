use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolgate::{app, config::GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("toolgate=info,tower_http=info")),
        )
        .init();

    if let Some(port) = config.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()?;
        info!("Prometheus metrics on port {}", port);
    }

    let host = config.host.clone();
    let port = config.port;
    let state = app::build_state(config).await.map_err(|e| anyhow::anyhow!(e))?;
    let router = app::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("toolgate listening on {}:{}", host, port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: app::AppState) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down; closing MCP connections");
    state.mcp_pool.shutdown().await;
}
