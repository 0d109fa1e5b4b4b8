use appstore::config::{Config as AppStoreConfig, ValidationError as AppStoreValidationError};
use ingest_service::config::{
    BusConfig, Config as IngestConfig, NatsConfig, PostgresConfig, StorageConfig,
    ValidationError as IngestValidationError,
};
use serde::Deserialize;
use std::fs::File;

/// Overrides `ingest.storage` with a Postgres store at this DSN.
pub const PG_DSN_ENV: &str = "PG_DSN";
/// Overrides `appstore.api_host`.
pub const API_HOST_ENV: &str = "APP_STORE_API_HOST";
/// Comma-separated server list. Switches `ingest.bus` to NATS.
pub const NATS_SERVERS_ENV: &str = "NATS_SERVERS";
/// Overrides the NATS queue group.
pub const NATS_QUEUE_GROUP_ENV: &str = "NATS_QUEUE_GROUP";

fn default_metrics_prefix() -> String {
    "review_ingestor".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            sentry_dsn: None,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub appstore: AppStoreConfig,
    /// Required by `run` and `migrate`. `fetch` works without it.
    pub ingest: Option<IngestConfig>,
    pub admin_listener: Option<Listener>,
}

impl Config {
    /// Loads the file, applies environment overrides and validates the result.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let mut config: Config = serde_yaml::from_reader(file)?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(API_HOST_ENV).filter(|v| !v.is_empty()) {
            self.appstore.api_host = host;
        }

        if let Some(dsn) = lookup(PG_DSN_ENV).filter(|v| !v.is_empty()) {
            match &mut self.ingest_mut().storage {
                StorageConfig::Postgres(pg) => pg.dsn = dsn,
                storage => *storage = StorageConfig::Postgres(PostgresConfig::new(dsn)),
            }
        }

        if let Some(servers) = lookup(NATS_SERVERS_ENV).filter(|v| !v.is_empty()) {
            let servers: Vec<String> = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            match &mut self.ingest_mut().bus {
                BusConfig::Nats(nats) => nats.servers = servers,
                bus => *bus = BusConfig::Nats(NatsConfig::new(servers)),
            }
        }

        let group = lookup(NATS_QUEUE_GROUP_ENV).filter(|v| !v.is_empty());
        if let (Some(group), Some(BusConfig::Nats(nats))) =
            (group, self.ingest.as_mut().map(|ingest| &mut ingest.bus))
        {
            nats.queue_group = group;
        }
    }

    fn ingest_mut(&mut self) -> &mut IngestConfig {
        self.ingest.get_or_insert_with(|| IngestConfig {
            storage: StorageConfig::Memory,
            bus: BusConfig::default(),
            consumer: Default::default(),
            max_total: 500,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.appstore.validate()?;
        if let Some(ingest) = &self.ingest {
            ingest.validate()?;
        }
        if matches!(&self.admin_listener, Some(listener) if listener.port == 0) {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    pub fn ingest(&self) -> Result<&IngestConfig, ConfigError> {
        self.ingest
            .as_ref()
            .ok_or(ConfigError::MissingSection("ingest"))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid appstore config: {0}")]
    AppStore(#[from] AppStoreValidationError),
    #[error("invalid ingest config: {0}")]
    Ingest(#[from] IngestValidationError),
    #[error("admin_listener.port cannot be 0")]
    InvalidPort,
    #[error("config section `{0}` is required for this command")]
    MissingSection(&'static str),
}
