use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::{GeneratorMode, SearchPollerConfig, SOCIAL_NETWORKS_GRAPH_GENERATOR};

/// Which backend holds graph searches and processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => bail!("STORE must be \"postgres\" or \"memory\", got {other:?}"),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    /// Required when `store` is `Postgres`.
    pub database_url: Option<String>,
    pub port: u16,
    pub processor_name: String,
    pub processor_instance: String,
    /// `API=false` keeps server mode from serving HTTP.
    pub api_enabled: bool,
    pub graph_generator_provider: String,
    pub graph_generator_path: String,
    pub graph_generator_mode: GeneratorMode,
    pub graph_generator_timeout: Option<Duration>,
    pub wait_time: Duration,
    pub wait_on_store_error: Duration,
    pub watch_interval: Duration,
    /// MIME prefixes rejected when creating URL searches.
    pub invalid_mimes: Vec<String>,
    pub debug: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store = var("STORE")
            .map(|value| value.parse::<StoreKind>())
            .transpose()?
            .unwrap_or(StoreKind::Postgres);

        let database_url = var("DATABASE_URL");
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set (or STORE=memory)");
        }

        let graph_generator_provider =
            var("GRAPH_GENERATOR_PROVIDER").unwrap_or_else(|| SOCIAL_NETWORKS_GRAPH_GENERATOR.to_string());
        if graph_generator_provider != SOCIAL_NETWORKS_GRAPH_GENERATOR {
            bail!(
                "Processor can't work without a valid GRAPH_GENERATOR_PROVIDER:{:?} -> should be in \"{}\"",
                graph_generator_provider,
                SOCIAL_NETWORKS_GRAPH_GENERATOR
            );
        }

        let millis = |key: &str, default: u64| -> Result<Duration> {
            let value = match var(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a number of milliseconds"))?,
                None => default,
            };
            Ok(Duration::from_millis(value))
        };

        Ok(Self {
            store,
            database_url,
            port: var("PORT")
                .or_else(|| var("SERVER_PORT"))
                .unwrap_or_else(|| "4000".to_string())
                .trim()
                .parse()
                .context("PORT must be a valid number")?,
            processor_name: var("PROCESSOR_NAME").unwrap_or_else(|| "noname".to_string()),
            processor_instance: var("PROCESSOR_ID").unwrap_or_else(|| "1".to_string()),
            api_enabled: var("API").map_or(true, |value| value.trim() != "false"),
            graph_generator_provider,
            graph_generator_path: var("GRAPH_GENERATOR_PATH")
                .unwrap_or_else(|| SOCIAL_NETWORKS_GRAPH_GENERATOR.to_string()),
            graph_generator_mode: var("GRAPH_GENERATOR_MODE")
                .map(|value| value.parse::<GeneratorMode>())
                .transpose()
                .map_err(anyhow::Error::msg)?
                .unwrap_or_default(),
            graph_generator_timeout: var("GRAPH_GENERATOR_TIMEOUT_SECS")
                .map(|value| value.trim().parse::<u64>())
                .transpose()
                .context("GRAPH_GENERATOR_TIMEOUT_SECS must be a number of seconds")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            wait_time: millis("WAIT_TIME_MS", 1_000)?,
            wait_on_store_error: millis("WAIT_TIME_ON_DB_ERROR_MS", 30_000)?,
            watch_interval: millis("WATCH_INTERVAL_MS", 2_000)?,
            invalid_mimes: var("INVALID_MIMES")
                .unwrap_or_else(|| "image,video,application".to_string())
                .split(',')
                .map(|mime| mime.trim().to_string())
                .filter(|mime| !mime.is_empty())
                .collect(),
            debug: var("DEBUG"),
        })
    }

    /// Identity of this process: `{name}_{instance}_{mode}`.
    pub fn processor_id(&self, mode: &str) -> String {
        format!("{}_{}_{}", self.processor_name, self.processor_instance, mode)
    }

    /// Database host only, so credentials never reach the processor metadata.
    pub fn database_host(&self) -> Option<String> {
        let url = url::Url::parse(self.database_url.as_deref()?).ok()?;
        url.host_str().map(str::to_string)
    }

    pub fn poller_config(&self, processor_id: &str) -> SearchPollerConfig {
        SearchPollerConfig {
            processor_id: processor_id.to_string(),
            wait_time: self.wait_time,
            wait_on_store_error: self.wait_on_store_error,
            watch_interval: self.watch_interval,
            tool_timeout: self.graph_generator_timeout,
        }
    }
}
