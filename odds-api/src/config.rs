use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8082".to_string());
        let server_port = port_str.parse().unwrap_or_else(|_| {
            eprintln!("Warning: Invalid PORT '{port_str}', defaulting to 8082");
            8082
        });

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_port,
            log_json: env::var("SCRAPE_LOG_JSON").map(|v| v == "true").unwrap_or(false),
        }
    }
}
