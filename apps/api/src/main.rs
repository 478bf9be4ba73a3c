mod config;
mod db;
mod errors;
mod models;
mod proposals;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::proposals::cache::ProposalCache;
use crate::proposals::service::ProposalService;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::memory::{MemoryObjectStore, MemorySubjectStore};
use crate::store::postgres::{PgObjectStore, PgSubjectStore};
use crate::store::{ObjectStore, SubjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Recall API v{}", env!("CARGO_PKG_VERSION"));

    let (subjects, objects) = build_stores(&config).await?;

    let cache = ProposalCache::new(config.cache_ttl, config.cache_capacity);
    info!(
        "Proposal cache: ttl {}s, capacity {}",
        config.cache_ttl.as_secs(),
        config.cache_capacity
    );

    let state = AppState {
        config: config.clone(),
        proposals: Arc::new(ProposalService::new(subjects, objects, cache)),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Picks the storage adapters named by `STORE_BACKEND`.
async fn build_stores(
    config: &Config,
) -> Result<(Arc<dyn SubjectStore>, Arc<dyn ObjectStore>)> {
    let subjects: Arc<dyn SubjectStore>;
    let objects: Arc<dyn ObjectStore>;
    match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let db = create_pool(url).await?;
            subjects = Arc::new(PgSubjectStore::new(db.clone()));
            objects = Arc::new(PgObjectStore::new(db));
        }
        StoreBackend::Memory => {
            info!("Using in-memory stores; data is lost on restart");
            subjects = Arc::new(MemorySubjectStore::new());
            objects = Arc::new(MemoryObjectStore::new());
        }
    }
    Ok((subjects, objects))
}
