use std::{fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::db::RetryPolicy;

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub firebase_api_key: String,
    pub identity_url: String,
    pub store_timeout: Duration,
    pub store_retries: u32,
    pub max_username_probes: u32,
    pub reconcile_interval: Option<Duration>,
    pub reconcile_page_size: u32,
}

impl Config {
    /// Reads the environment, after loading `.env` if one exists.
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("PORT", "8080")?,
            database_url: try_load("DATABASE_URL", "sqlite://gamespheres.db?mode=rwc")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "16")?,
            firebase_api_key: require("FIREBASE_API_KEY")?,
            identity_url: try_load("IDENTITY_URL", "https://identitytoolkit.googleapis.com")?,
            store_timeout: Duration::from_millis(try_load("STORE_TIMEOUT_MS", "2000")?),
            store_retries: try_load("STORE_RETRIES", "1")?,
            max_username_probes: try_load::<u32>("MAX_USERNAME_PROBES", "1000")?.max(1),
            reconcile_interval: match try_load("RECONCILE_INTERVAL_SECS", "0")? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            reconcile_page_size: try_load::<u32>("RECONCILE_PAGE_SIZE", "200")?.max(1),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.store_timeout,
            retries: self.store_retries,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = dotenv::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("invalid {key}={raw:?}: {e}")
    })
}

fn require(key: &str) -> anyhow::Result<String> {
    dotenv::var(key).with_context(|| format!("{key} must be set"))
}
