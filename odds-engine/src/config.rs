//! Runtime configuration (spec §2 Ambient stack), loaded once from the
//! process environment at startup.

use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,

    pub reference_base_url: String,
    pub reference_api_key: String,
    pub sportybet_base_url: String,
    pub sportybet_api_key: String,
    pub bet9ja_base_url: String,
    pub bet9ja_api_key: String,

    pub server_port: u16,
    pub log_json: bool,
    pub retention_days: i64,
    pub partition_maintenance_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
        let server_port = port_str.parse().unwrap_or_else(|_| {
            eprintln!("Warning: Invalid PORT '{port_str}', defaulting to 8081");
            8081
        });

        let retention_days = env::var("SNAPSHOT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            reference_base_url: env::var("REFERENCE_BASE_URL").unwrap_or_default(),
            reference_api_key: env::var("REFERENCE_API_KEY").unwrap_or_default(),
            sportybet_base_url: env::var("SPORTYBET_BASE_URL").unwrap_or_default(),
            sportybet_api_key: env::var("SPORTYBET_API_KEY").unwrap_or_default(),
            bet9ja_base_url: env::var("BET9JA_BASE_URL").unwrap_or_default(),
            bet9ja_api_key: env::var("BET9JA_API_KEY").unwrap_or_default(),

            server_port,
            log_json: env::var("SCRAPE_LOG_JSON").map(|v| v == "true").unwrap_or(false),
            retention_days,
            partition_maintenance_interval: Duration::from_secs(3600),
        }
    }
}
