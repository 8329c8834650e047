//! Process configuration read from the environment (and `.env` via dotenvy).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub listen_addr: String,
    pub catalog_path: PathBuf,
    /// Notifications go to Redis when set, to the log otherwise
    pub redis_url: Option<String>,
    pub grading_workers: usize,
    pub grading_queue_capacity: usize,
    pub slave_refresh_interval: Duration,
    pub unfreeze_check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub listen_addr: String,
    pub cache_dir: PathBuf,
}

impl MasterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            listen_addr: lookup("MASTER_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:28498".into()),
            catalog_path: lookup("CATALOG_PATH")
                .unwrap_or_else(|| "./files/catalog.toml".into())
                .into(),
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            grading_workers: parse_or(&lookup, "GRADING_WORKERS", 4)?,
            grading_queue_capacity: parse_or(&lookup, "GRADING_QUEUE_CAPACITY", 64)?,
            slave_refresh_interval: Duration::from_secs(parse_or(
                &lookup,
                "SLAVE_REFRESH_INTERVAL_SECS",
                60,
            )?),
            unfreeze_check_interval: Duration::from_secs(parse_or(
                &lookup,
                "UNFREEZE_CHECK_INTERVAL_SECS",
                30,
            )?),
        })
    }
}

impl SlaveConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            listen_addr: lookup("SLAVE_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:28499".into()),
            cache_dir: lookup("SLAVE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("gavel-cache")),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
