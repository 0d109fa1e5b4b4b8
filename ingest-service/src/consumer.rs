use crate::bus::{BusError, MessageSource};
use crate::events::InboundMessage;
use crate::metrics_defs::MESSAGES_SKIPPED;
use crate::service::IngestService;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Pulls requests off a `MessageSource` one at a time and runs a saga for each.
pub struct Consumer<S> {
    source: S,
    service: Arc<IngestService>,
    processing_timeout: Duration,
}

impl<S: MessageSource> Consumer<S> {
    pub fn new(source: S, service: Arc<IngestService>, processing_timeout: Duration) -> Self {
        Consumer {
            source,
            service,
            processing_timeout,
        }
    }

    /// Runs until the source is exhausted or `shutdown` fires. A saga in flight when
    /// `shutdown` fires is cancelled and awaited.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ConsumerStats, BusError> {
        let mut stats = ConsumerStats::default();

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, consumer stopping");
                    break;
                }
                message = self.source.recv() => message?,
            };

            let Some(message) = message else {
                tracing::info!("message source exhausted, consumer stopping");
                break;
            };

            self.process(&message, &shutdown, &mut stats).await;
        }

        Ok(stats)
    }

    async fn process(&self, message: &[u8], shutdown: &CancellationToken, stats: &mut ConsumerStats) {
        let inbound: InboundMessage = match serde_json::from_slice(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                stats.skipped += 1;
                counter!(MESSAGES_SKIPPED).increment(1);
                tracing::warn!(event = "consumer.message.decoded", status = "failed", error = %e);
                return;
            }
        };
        tracing::debug!(
            event = "consumer.message.decoded",
            status = "success",
            saga_id = %inbound.saga_id
        );

        let cancel = shutdown.child_token();
        let saga = self.service.handle(&inbound.saga_id, &inbound.payload, &cancel);
        tokio::pin!(saga);

        let result = tokio::select! {
            result = &mut saga => result,
            _ = tokio::time::sleep(self.processing_timeout) => {
                tracing::warn!(
                    saga_id = %inbound.saga_id,
                    timeout_secs = self.processing_timeout.as_secs(),
                    "processing timeout reached, cancelling saga"
                );
                cancel.cancel();
                saga.await
            }
        };

        match result {
            Ok(report) => {
                stats.succeeded += 1;
                tracing::info!(
                    event = "consumer.message.processed",
                    status = "success",
                    saga_id = %inbound.saga_id,
                    count = report.count
                );
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(
                    event = "consumer.message.processed",
                    status = "failed",
                    saga_id = %inbound.saga_id,
                    error = %e
                );
            }
        }
    }
}
