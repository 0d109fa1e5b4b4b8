use crate::metrics_defs::{MetricDef, describe};
use metrics_exporter_statsd::StatsdBuilder;

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd exporter: {0}")]
    Exporter(String),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Installs a statsd recorder as the global `metrics` recorder and registers the
/// descriptions of the given metric catalogues.
pub fn install_statsd(
    host: &str,
    port: u16,
    prefix: &str,
    catalogues: &[&[MetricDef]],
) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(host, port)
        .build(Some(prefix))
        .map_err(|e| MetricsError::Exporter(e.to_string()))?;

    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

    for defs in catalogues {
        describe(defs);
    }

    tracing::info!(host, port, prefix, "statsd metrics exporter installed");
    Ok(())
}
