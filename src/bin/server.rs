//! Binary entry point: wires the shared services together and serves the
//! HTTP/WS API built in [`probelab::api`].

use std::net::SocketAddr;
use std::sync::Arc;

use probelab::api::{build_router, AppState};
use probelab::batch::BatchRegistry;
use probelab::cache::InMemoryCache;
use probelab::config::Config;
use probelab::orchestrator::Orchestrator;
use probelab::progress::ProgressBus;
use probelab::store::InMemoryStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env();
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let bus = Arc::new(ProgressBus::new());
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), cache, bus, config.clone()));
    let batches = Arc::new(BatchRegistry::new());

    let state = Arc::new(AppState { orchestrator, store, batches, config });
    let app = build_router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!(%addr, "starting probelab-server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
