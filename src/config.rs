// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use dotenvy::dotenv;

use crate::store::DEFAULT_MAX_BATCH_WRITES;

/// Optimistic transaction attempts before giving up (store default).
pub const DEFAULT_TX_MAX_ATTEMPTS: u32 = 5;

/// Base delay for the jittered exponential backoff between attempts.
pub const DEFAULT_TX_BACKOFF_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub tx_max_attempts: u32,
    pub tx_backoff_ms: u64,
    pub max_batch_writes: usize,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    parse_value(key, env::var(key).ok(), default)
}

/// Runs before logging is installed, so a bad value stops startup instead of
/// being reported.
fn parse_value<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid value, got {raw:?}")),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000))),
            tx_max_attempts: parse_or("TX_MAX_ATTEMPTS", DEFAULT_TX_MAX_ATTEMPTS),
            tx_backoff_ms: parse_or("TX_BACKOFF_MS", DEFAULT_TX_BACKOFF_MS),
            max_batch_writes: parse_or("MAX_BATCH_WRITES", DEFAULT_MAX_BATCH_WRITES),
        }
    }

    /// In-memory configuration with store defaults, used by tests and tooling.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            rust_log: "error".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tx_max_attempts: DEFAULT_TX_MAX_ATTEMPTS,
            tx_backoff_ms: DEFAULT_TX_BACKOFF_MS,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
        }
    }
}
