//! inkdash server
//!
//! Run with: cargo run --features axum --bin inkdash-server
//!
//! Reads `inkdash.yaml` (or the file named by `INKDASH_CONFIG`). Log level
//! follows `RUST_LOG`, defaulting to `info`.

use std::net::SocketAddr;
use std::sync::Arc;

use inkdash::server::{router, AppState};
use inkdash::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state);

    tracing::info!("Serving {} devices on http://{}", config.devices.len(), config.listen);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
