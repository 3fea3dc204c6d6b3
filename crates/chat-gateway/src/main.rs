use std::net::SocketAddr;
use std::sync::Arc;

use chat_gateway::app;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("CHAT_CONFIG").ok();
    let config = chat_core::config::AppConfig::load(config_path.as_deref())?;

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(config)?);
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("chat gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<chat_gateway::app::AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, closing sockets");
    state.hub.shutdown_all("server is shutting down").await;
}
