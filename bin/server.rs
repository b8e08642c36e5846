// Cat Registry - Web Server

use std::net::SocketAddr;
use tokio::signal;

use cat_registry::{
    api::{create_router, AppState},
    init_tracing, CatService, Config, SqliteCatMapper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        Config::default()
    });
    init_tracing(&config.logging)?;

    let mapper = SqliteCatMapper::open(&config.database.path)?.with_actor("api");
    tracing::info!(path = ?config.database.path, cats = mapper.count()?, "database opened");

    let state = AppState::new(CatService::new(mapper));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API: http://{}/api/cats", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
}
