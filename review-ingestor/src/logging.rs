use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("could not install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Logs go to stderr; stdout carries the event stream.
///
/// When a Sentry DSN is configured the returned guard must be held until exit so that
/// buffered events are flushed.
pub fn init(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, LoggingError> {
    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(
            sentry_guard
                .is_some()
                .then(sentry::integrations::tracing::layer),
        )
        .try_init()?;

    Ok(sentry_guard)
}
