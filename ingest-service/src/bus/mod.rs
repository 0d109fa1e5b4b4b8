//! Transport seams for the saga: where requests come from and where completion events
//! go. The consumer and orchestrator only see these traits.

pub mod lines;
pub mod memory;
pub mod nats;

use crate::events::{Envelope, ExtractCompleted};
use async_trait::async_trait;

pub use lines::{LinePublisher, LineSource};
pub use memory::{ChannelPublisher, ChannelSource, Published};
pub use nats::{NatsPublisher, NatsSource};

type BrokerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("failed to read message: {0}")]
    Io(#[from] std::io::Error),
    #[error("message broker error: {0}")]
    Broker(#[source] BrokerError),
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
    #[error("message broker error: {0}")]
    Broker(#[source] BrokerError),
    #[error("event sink closed")]
    Closed,
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next raw message, or `None` once the source is exhausted.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, BusError>;
}

#[async_trait]
impl<S: MessageSource + ?Sized> MessageSource for Box<S> {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, BusError> {
        (**self).recv().await
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `envelope` with `key` as its routing key.
    async fn publish(
        &self,
        key: &str,
        envelope: &Envelope<ExtractCompleted>,
    ) -> Result<(), PublishError>;
}
