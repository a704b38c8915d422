mod api;
mod broadcaster;
mod cli;
mod clients;
mod config;
mod orchestrator;
mod run_metadata;

use crate::api::AppState;
use crate::broadcaster::Broadcaster;
use crate::clients::bet9ja::Bet9jaClient;
use crate::clients::reference::ReferenceClient;
use crate::clients::sportybet::SportybetClient;
use crate::orchestrator::Orchestrator;
use crate::run_metadata::RunMetadataStore;
use clap::Parser;
use config::Config;
use odds_core::registry::MarketRegistry;
use odds_core::snapshot_store::SnapshotStore;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(config.log_json);

    info!("starting odds-engine");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;
    info!("connected to postgres");

    let registry = Arc::new(MarketRegistry::load());
    let run_metadata = Arc::new(RunMetadataStore::new(pool.clone()));
    let broadcaster = Arc::new(Broadcaster::new());

    let reference_client =
        Arc::new(ReferenceClient::new(config.reference_base_url.clone(), config.reference_api_key.clone()));
    let sportybet_client =
        Arc::new(SportybetClient::new(config.sportybet_base_url.clone(), config.sportybet_api_key.clone()));
    let bet9ja_client =
        Arc::new(Bet9jaClient::new(config.bet9ja_base_url.clone(), config.bet9ja_api_key.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        registry,
        run_metadata.clone(),
        broadcaster.clone(),
        reference_client.clone(),
        sportybet_client.clone(),
        bet9ja_client.clone(),
    ));

    spawn_partition_maintenance(pool.clone(), config.partition_maintenance_interval);

    let cli = cli::Cli::parse();
    match cli.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => serve(config, orchestrator, run_metadata, broadcaster, reference_client, sportybet_client, bet9ja_client).await,
        cli::Command::Scrape { platforms, sport_id, tournament_id, timeout_seconds, summary_only } => {
            let code = cli::run_scrape_once(
                orchestrator,
                run_metadata,
                platforms,
                sport_id,
                tournament_id,
                timeout_seconds,
                summary_only,
            )
            .await;
            std::process::exit(code);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    config: Config,
    orchestrator: Arc<Orchestrator>,
    run_metadata: Arc<RunMetadataStore>,
    broadcaster: Arc<Broadcaster>,
    reference_client: Arc<ReferenceClient>,
    sportybet_client: Arc<SportybetClient>,
    bet9ja_client: Arc<Bet9jaClient>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        orchestrator,
        run_metadata,
        broadcaster,
        reference_client,
        sportybet_client,
        bet9ja_client,
    });

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!(%addr, "api server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Keeps `market_odds` partitioned 7 days ahead and drops partitions past
/// the retention window (spec §4.E).
fn spawn_partition_maintenance(pool: sqlx::PgPool, interval: Duration) {
    tokio::spawn(async move {
        let store = SnapshotStore::new(pool);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = store.provision_upcoming_partitions().await {
                error!(error = %e, "failed to provision upcoming partitions");
            }
            match store.drop_expired_partitions().await {
                Ok(dropped) if dropped > 0 => info!(dropped, "dropped expired snapshot partitions"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to drop expired partitions"),
            }
        }
    });
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    if json {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
