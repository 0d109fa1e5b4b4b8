use crate::events::{EXTRACT_COMPLETED_TOPIC, EXTRACT_REQUEST_TOPIC};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("storage.dsn cannot be empty")]
    EmptyDsn,

    #[error("storage.max_connections must be greater than 0")]
    InvalidMaxConnections,

    #[error("max_total must be greater than 0")]
    InvalidMaxTotal,

    #[error("consumer.processing_timeout_secs must be greater than 0")]
    InvalidProcessingTimeout,

    #[error("bus.servers cannot be empty")]
    NoBusServers,

    #[error("bus.{0} cannot be empty")]
    EmptyBusField(&'static str),
}

fn default_max_total() -> usize {
    500
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Upper bound on the reviews fetched per country, whatever the request asks for.
    #[serde(default = "default_max_total")]
    pub max_total: usize,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.storage.validate()?;
        self.bus.validate()?;

        if self.max_total == 0 {
            return Err(ValidationError::InvalidMaxTotal);
        }
        if self.consumer.processing_timeout_secs == 0 {
            return Err(ValidationError::InvalidProcessingTimeout);
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    Postgres(PostgresConfig),
    /// Process-local store. Nothing survives a restart.
    Memory,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StorageConfig::Postgres(pg) => {
                if pg.dsn.trim().is_empty() {
                    return Err(ValidationError::EmptyDsn);
                }
                if pg.max_connections == 0 {
                    return Err(ValidationError::InvalidMaxConnections);
                }
                Ok(())
            }
            StorageConfig::Memory => Ok(()),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PostgresConfig {
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    pub fn new(dsn: String) -> Self {
        PostgresConfig {
            dsn,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Where extract requests come from and where completion events go.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusConfig {
    /// Newline-delimited JSON on stdin and stdout.
    #[default]
    Stdio,
    Nats(NatsConfig),
}

impl BusConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let BusConfig::Nats(nats) = self else {
            return Ok(());
        };
        if nats.servers.iter().all(|s| s.trim().is_empty()) {
            return Err(ValidationError::NoBusServers);
        }
        for (field, value) in [
            ("queue_group", &nats.queue_group),
            ("request_subject", &nats.request_subject),
            ("completed_subject", &nats.completed_subject),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyBusField(field));
            }
        }
        Ok(())
    }
}

fn default_queue_group() -> String {
    "review-ingestor".into()
}

fn default_request_subject() -> String {
    EXTRACT_REQUEST_TOPIC.into()
}

fn default_completed_subject() -> String {
    EXTRACT_COMPLETED_TOPIC.into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    /// Replicas in the same group split the request subject between them.
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
    #[serde(default = "default_request_subject")]
    pub request_subject: String,
    #[serde(default = "default_completed_subject")]
    pub completed_subject: String,
    #[serde(default = "default_queue_group")]
    pub client_name: String,
}

impl NatsConfig {
    pub fn new(servers: Vec<String>) -> Self {
        NatsConfig {
            servers,
            queue_group: default_queue_group(),
            request_subject: default_request_subject(),
            completed_subject: default_completed_subject(),
            client_name: default_queue_group(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Deadline for one saga. On expiry the saga is cancelled and its partial work kept.
    pub processing_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            processing_timeout_secs: 600,
        }
    }
}

impl ConsumerConfig {
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}
