// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. Without it responses are kept in memory.
    pub database_url: Option<String>,
    pub rust_log: String,
    pub bind_addr: String,
    /// Slack allowed on top of a form's time budget when checking `durationMs`.
    pub duration_grace_ms: i64,
    pub submit_timeout_secs: u64,
    pub submit_retry_delay_ms: u64,
    /// JSON file of form definitions loaded at startup.
    pub forms_seed: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            rust_log: "info".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            duration_grace_ms: 5_000,
            submit_timeout_secs: 30,
            submit_retry_delay_ms: 1_500,
            forms_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let rust_log = env::var("RUST_LOG").unwrap_or(defaults.rust_log);

        let bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);

        Self {
            database_url,
            rust_log,
            bind_addr,
            duration_grace_ms: parse_or("DURATION_GRACE_MS", defaults.duration_grace_ms),
            submit_timeout_secs: parse_or("SUBMIT_TIMEOUT_SECS", defaults.submit_timeout_secs),
            submit_retry_delay_ms: parse_or("SUBMIT_RETRY_DELAY_MS", defaults.submit_retry_delay_ms),
            forms_seed: env::var("FORMS_SEED").ok().filter(|v| !v.is_empty()),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
