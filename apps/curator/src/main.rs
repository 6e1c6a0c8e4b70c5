mod config;
mod curation;
mod db;
mod errors;
mod models;
mod repository;
mod routes;
mod scheduler;
mod state;
#[cfg(test)]
mod testing;
mod twitch_client;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::curation::engine::GenerationEngine;
use crate::curation::provider::ClipRankingProvider;
use crate::curation::strategies::StrategyRegistry;
use crate::db::{create_pool, run_migrations};
use crate::repository::corpus::PgClipCorpus;
use crate::repository::playlists::PgPlaylistStore;
use crate::repository::scripts::PgScriptRepository;
use crate::routes::build_router;
use crate::scheduler::{Scheduler, StatusBoard};
use crate::state::AppState;
use crate::twitch_client::TwitchClient;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting curator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool_size = (config.scheduler_max_concurrent as u32).max(1) * 2 + 4;
    let db = create_pool(&config.database_url, pool_size).await?;
    run_migrations(&db).await?;

    let scripts = Arc::new(PgScriptRepository::new(db.clone()));
    let playlists = Arc::new(PgPlaylistStore::new(db.clone()));
    let corpus = Arc::new(PgClipCorpus::new(db));

    // External strategies fail per run when no provider is configured
    let provider: Option<Arc<dyn ClipRankingProvider>> = match config.twitch_credentials() {
        Some((client_id, client_secret)) => Some(Arc::new(TwitchClient::new(
            client_id,
            client_secret,
            config.provider_timeout(),
            config.provider_request_budget,
        )?)),
        None => {
            warn!("TWITCH_CLIENT_ID/TWITCH_CLIENT_SECRET not set; twitch_* strategies are unavailable");
            None
        }
    };

    let registry = StrategyRegistry::with_defaults();
    info!("Registered {} curation strategies", registry.len());

    let engine = GenerationEngine::new(scripts.clone(), playlists, corpus, provider, registry);
    let scheduler_status = Arc::new(StatusBoard::default());

    let cancel = CancellationToken::new();
    let scheduler_task = if config.scheduler_enabled {
        let scheduler = Scheduler::new(
            engine.clone(),
            config.scheduler_tick(),
            config.scheduler_max_concurrent,
            Arc::clone(&scheduler_status),
        );
        Some(tokio::spawn(scheduler.run(cancel.clone())))
    } else {
        info!("Scheduler disabled (SCHEDULER_ENABLED=false)");
        None
    };

    let state = AppState {
        config: config.clone(),
        scripts,
        engine,
        scheduler_status,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    if let Some(task) = scheduler_task {
        cancel.cancel();
        if let Err(e) = task.await {
            warn!("Scheduler task ended abnormally: {e}");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C and cancels background work.
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
