//! One-shot CLI mode (spec §6): run a single scrape cycle to completion
//! and exit, rather than serving the long-running API surface.

use crate::orchestrator::{DetailLevel, Orchestrator, ScrapeRequest};
use clap::{Parser, Subcommand};
use odds_core::model::{Platform, RunStatus, RunTrigger};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "odds-engine", about = "Betpawa/SportyBet/Bet9ja odds scraper")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the long-lived API server (default when no subcommand is given).
    Serve,
    /// Run a single scrape cycle to completion, then exit.
    Scrape {
        /// Comma-separated platform slugs: reference,sportybet,bet9ja. Defaults to all three.
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<String>,
        #[arg(long)]
        sport_id: Option<i64>,
        #[arg(long)]
        tournament_id: Option<i64>,
        #[arg(long, default_value_t = 120)]
        timeout_seconds: u64,
        #[arg(long, default_value_t = false)]
        summary_only: bool,
    },
}

/// Exit codes (spec §6): 0 completed, 1 partial, 2 failed, 3 invalid arguments.
pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FAILED: i32 = 2;
pub const EXIT_INVALID_ARGS: i32 = 3;

pub async fn run_scrape_once(
    orchestrator: Arc<Orchestrator>,
    run_metadata: Arc<crate::run_metadata::RunMetadataStore>,
    platforms: Vec<String>,
    sport_id: Option<i64>,
    tournament_id: Option<i64>,
    timeout_seconds: u64,
    summary_only: bool,
) -> i32 {
    let platforms = if platforms.is_empty() {
        Platform::all().to_vec()
    } else {
        match platforms.iter().map(|p| Platform::from_str(p)).collect::<Result<Vec<_>, _>>() {
            Ok(platforms) => platforms,
            Err(e) => {
                eprintln!("invalid platform: {e}");
                return EXIT_INVALID_ARGS;
            }
        }
    };

    let request = ScrapeRequest {
        platforms,
        sport_id,
        tournament_id,
        timeout_seconds,
        detail: if summary_only { DetailLevel::Summary } else { DetailLevel::Full },
        trigger: RunTrigger::Manual,
    };

    let run_id = match orchestrator.start(request).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to open scrape run");
            return EXIT_FAILED;
        }
    };

    info!(run_id, "scrape run started, waiting for completion");
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        match run_metadata.get_run(run_id).await {
            Ok(Some(run)) if run.status != RunStatus::Running => {
                println!(
                    "run {} finished: status={:?} scraped={} failed={}",
                    run_id, run.status, run.events_scraped, run.events_failed
                );
                return match run.status {
                    RunStatus::Completed => EXIT_COMPLETED,
                    RunStatus::Partial => EXIT_PARTIAL,
                    RunStatus::Failed | RunStatus::Running => EXIT_FAILED,
                };
            }
            Ok(_) => continue,
            Err(e) => {
                error!(run_id, error = %e, "failed to poll run status");
                return EXIT_FAILED;
            }
        }
    }
}
