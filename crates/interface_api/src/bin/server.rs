//! Boarding-house billing API server
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin boarding-billing-api
//!
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin boarding-billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level used when `RUST_LOG` is unset (default: info)
//! * `API_CURRENCY` - Currency debt is reported in (default: VND)
//! * `API_LOCALE` - `vi` or `en` for amounts in words (default: vi)
//! * `API_TIMEZONE` - Timezone deciding the current billing month (default: Asia/Ho_Chi_Minh)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::HealthCheckable;
use domain_billing::BillingService;
use infra_db::{
    create_pool, run_migrations, DatabaseConfig, PostgresBillStore, PostgresHistoryStore, PostgresOccupancyAdapter,
    PostgresRateConfigAdapter,
};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("loading API configuration")?;
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        currency = %config.currency,
        timezone = %config.timezone,
        "Starting boarding-house billing API server"
    );

    let settings = config.billing_settings().context("billing settings")?;

    let pool = create_pool(DatabaseConfig::new(config.database_url.clone()))
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let rates = Arc::new(PostgresRateConfigAdapter::new(pool.clone()));
    let occupancy = Arc::new(PostgresOccupancyAdapter::new(pool.clone()));
    let bills = Arc::new(PostgresBillStore::new(pool.clone()));
    let history = Arc::new(PostgresHistoryStore::new(pool));

    let health = vec![
        rates.clone() as Arc<dyn HealthCheckable>,
        occupancy.clone() as Arc<dyn HealthCheckable>,
        bills.clone() as Arc<dyn HealthCheckable>,
        history.clone() as Arc<dyn HealthCheckable>,
    ];
    let service = BillingService::new(rates, occupancy, bills, history, settings);

    let state = AppState::new(service, config.clone())
        .context("resolving timezone")?
        .with_health_checks(health);
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse().context("parsing server address")?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
