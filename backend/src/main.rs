//! Publishing Ledger - Backend Server
//!
//! Inventory and fulfillment back office for a book publisher: orders,
//! publisher and partner stock, corrections and payment reminders.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ledger_backend::{
    clock::SystemClock,
    create_app,
    external::{FasterMessageClient, HttpEmailClient},
    store::PgStore,
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_server=debug,ledger_backend=debug,tower_http=debug,sqlx=warn".into());
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting Publishing Ledger Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    if config.scheduler.cron_secret.is_none() {
        tracing::warn!("No cron secret configured; only publisher sessions can trigger notifications");
    }

    // Create application state
    let store = Arc::new(PgStore::new(db_pool));
    let state = AppState {
        config: Arc::new(config.clone()),
        inventory: store.clone(),
        notifications: store,
        sms: Arc::new(FasterMessageClient::new(config.sms.clone())),
        email: Arc::new(HttpEmailClient::new(config.email.clone())),
        clock: Arc::new(SystemClock),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
