// =============================================================================
// CINEMA BOOKING SERVICE - Main Entry Point
// =============================================================================
// Wires configuration, logging, metrics, the chosen store backend and the
// optional Redis seat cache around the booking engine, then serves HTTP.
//
// STARTUP ORDER:
//   1. .env + tracing
//   2. Config::from_env
//   3. Prometheus recorder
//   4. store (postgres: connect + migrate, memory: seed sample cinema)
//   5. Redis seat catalog cache, when REDIS_URL is set
//   6. hold sweeper task
//   7. HTTP server
// =============================================================================

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinema_booking::catalog::SeatCatalog;
use cinema_booking::clock::{Clock, SystemClock};
use cinema_booking::config::{Config, StoreBackend};
use cinema_booking::metrics::setup_metrics;
use cinema_booking::payment::spawn_hold_sweeper;
use cinema_booking::store::{BookingStore, InMemoryBookingStore, PgBookingStore};
use cinema_booking::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG controls levels, e.g. RUST_LOG=info,cinema_booking=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinema_booking=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Cinema Booking Service...");

    let config = Config::from_env()?;
    info!(port = config.port, store = ?config.store, "Configuration loaded");

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STORE
    // -------------------------------------------------------------------------
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn BookingStore> = match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
            let store = PgBookingStore::connect(url).await?;
            info!("Connected to PostgreSQL");

            store.run_migrations().await?;
            info!("Database migrations completed");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            let store = InMemoryBookingStore::new();
            let cinema = store.seed_sample_data(clock.now()).await?;
            warn!(
                hall_id = %cinema.hall.id,
                show_times = cinema.show_times.len(),
                "Using the in-memory store; data is lost on restart"
            );
            Arc::new(store)
        }
    };

    // -------------------------------------------------------------------------
    // SEAT CATALOG CACHE
    // -------------------------------------------------------------------------
    let mut catalog = SeatCatalog::new(store.clone());
    if let Some(redis_url) = &config.redis_url {
        let client = redis::Client::open(redis_url.as_str())?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        catalog = catalog.with_cache(conn, config.catalog_cache_ttl);
        info!("Connected to Redis");
    }

    let state = Arc::new(
        AppState::new(store, catalog, clock, config.booking.clone()).with_metrics(metrics_handle),
    );

    // -------------------------------------------------------------------------
    // HOLD SWEEPER
    // -------------------------------------------------------------------------
    let _sweeper = spawn_hold_sweeper(state.payments.clone(), config.hold_sweep_interval);
    info!(
        interval_secs = config.hold_sweep_interval.as_secs(),
        hold_secs = config.booking.hold_duration.as_secs(),
        "Hold sweeper started"
    );

    // -------------------------------------------------------------------------
    // HTTP SERVER
    // -------------------------------------------------------------------------
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Cinema Booking Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
