mod api;
mod config;
mod queries;

use config::Config;
use odds_core::registry::MarketRegistry;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(config.log_json);

    info!("starting odds-api");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;
    info!("connected to postgres");

    let registry = Arc::new(MarketRegistry::load());
    let app = api::router(pool, registry);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!(%addr, "history query service listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    if json {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
