use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_ADMIN_KEY: &str = "changeme-admin-key";

/// Limits applied by the session hub.
#[derive(Debug, Clone)]
pub struct Limits {
    pub rate_window: Duration,
    pub rate_max: u32,
    pub message_chars: usize,
    pub reason_chars: usize,
    pub snapshot_entries: usize,
    pub max_reports: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            rate_window: Duration::from_secs(3),
            rate_max: 6,
            message_chars: 2000,
            reason_chars: 400,
            snapshot_entries: 200,
            max_reports: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub admin_key: String,
    pub database_url: String,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();

        let port = match dotenv::var("PORT") {
            Ok(port) => port.parse().with_context(|| format!("PORT={port} is not a port"))?,
            Err(_) => 3000,
        };

        let admin_key = dotenv::var("ADMIN_KEY").unwrap_or_else(|_| {
            tracing::warn!("ADMIN_KEY not set, using the default key");
            DEFAULT_ADMIN_KEY.to_owned()
        });

        let database_url = dotenv::var("DATABASE_URL")
            .unwrap_or("sqlite://data/moderation.db?mode=rwc".to_owned());

        Ok(Config {
            port,
            admin_key,
            database_url,
            limits: Limits::default(),
        })
    }
}
