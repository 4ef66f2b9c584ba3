use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use boxoffice_api::{app, worker, AppState};
use boxoffice_core::{MemoryStore, TransactionalStore};
use boxoffice_reservation::HoldExpiry;
use boxoffice_store::app_config::{Config, StoreBackend};
use boxoffice_store::{DbClient, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "boxoffice_api=debug,boxoffice_reservation=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting boxoffice API on port {}", config.server.port);

    let store: Arc<dyn TransactionalStore> = match config.database.backend {
        StoreBackend::Postgres => {
            let db = DbClient::new(&config.database)
                .await
                .context("Failed to connect to PostgreSQL")?;
            if config.database.run_migrations {
                db.migrate().await.context("Failed to run migrations")?;
            }
            Arc::new(PgStore::new(db.pool, config.database.lock_timeout()))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on shutdown");
            Arc::new(MemoryStore::with_lock_timeout(config.database.lock_timeout()))
        }
    };

    let state = AppState::new(store);

    let expiry = HoldExpiry::new(
        state.reservations.clone(),
        config.reservations.hold(),
        config.reservations.sweep_batch_size,
    );
    tokio::spawn(worker::start_expiry_worker(
        expiry,
        config.reservations.sweep_interval(),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
