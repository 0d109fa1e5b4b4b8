use super::{BusError, EventPublisher, MessageSource, PublishError};
use crate::events::{Envelope, ExtractCompleted};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    /// Returns the sending half together with the source. The source is exhausted once
    /// every sender is dropped.
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, ChannelSource { rx })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, BusError> {
        Ok(self.rx.recv().await)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub key: String,
    pub envelope: Envelope<ExtractCompleted>,
}

pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Published>,
}

impl ChannelPublisher {
    /// Publishing fails with `PublishError::Closed` once the receiver is dropped.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelPublisher { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(
        &self,
        key: &str,
        envelope: &Envelope<ExtractCompleted>,
    ) -> Result<(), PublishError> {
        self.tx
            .send(Published {
                key: key.to_string(),
                envelope: envelope.clone(),
            })
            .map_err(|_| PublishError::Closed)
    }
}
